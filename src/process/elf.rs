//! ELF loader (SPEC_FULL §4.7).
//!
//! Validates the magic/class/type/ISA, walks the program-header table, and for each
//! loadable segment maps `p_memsz` bytes at `p_vaddr` in the target address space, copies
//! `p_filesz` bytes from the file image, and zeroes the tail. Field layout and check order
//! grounded directly on `original_source/tasking/elf.c`'s `elf_check`/`elf_load`; the
//! struct-definition idiom (named fields, `#[repr(u\*)]` tag enums) follows teacher
//! `src/fzboot/process/loader/elf/header.rs`, narrowed from its 64-bit/section-header-
//! aware shape to the 32-bit, program-header-only subset this kernel actually loads.

use alloc::vec::Vec;
use bytemuck::{Pod, Zeroable};

use crate::errors::ProcessError;
use crate::mem::VirtAddr;
use crate::x86::paging::{PageTable, PagingManager};

const MAGIC: [u8; 4] = [0x7F, b'E', b'L', b'F'];
const CLASS_32: u8 = 1;
const TYPE_EXEC: u16 = 2;
const ISA_NONE: u16 = 0;
const ISA_X86: u16 = 3;

#[derive(Clone, Copy, Pod, Zeroable)]
#[repr(C)]
struct ElfHeader32 {
    magic: [u8; 4],
    class: u8,
    endianness: u8,
    version0: u8,
    unused: [u8; 9],
    file_type: u16,
    instruction_set: u16,
    version1: u32,
    entry: u32,
    program_header_table: u32,
    section_header_table: u32,
    flags: u32,
    header_size: u16,
    ph_entry_size: u16,
    ph_entry_count: u16,
    sh_entry_size: u16,
    sh_entry_count: u16,
    sh_index: u16,
}

#[derive(Clone, Copy, Pod, Zeroable)]
#[repr(C)]
struct ElfProgramHeader32 {
    segment_type: u32,
    p_offset: u32,
    p_vaddr: u32,
    undefined: u32,
    p_filesz: u32,
    p_memsz: u32,
    flags: u32,
    align: u32,
}

const PT_LOAD: u32 = 1;

/// One `(vaddr, memsz)` pair recorded on the process's segment list, so a later `exit` can
/// unmap and free exactly what was loaded (SPEC_FULL §4.7, Data Model "Process").
#[derive(Clone, Copy, Debug)]
pub struct LoadedSegment {
    pub vaddr: VirtAddr,
    pub memsz: u32,
}

fn header_of(image: &[u8]) -> Result<&ElfHeader32, ProcessError> {
    if image.len() < core::mem::size_of::<ElfHeader32>() {
        return Err(ProcessError::BadElf);
    }
    let header: &ElfHeader32 = bytemuck::from_bytes(&image[..core::mem::size_of::<ElfHeader32>()]);

    if header.magic != MAGIC {
        return Err(ProcessError::BadElf);
    }
    if header.class != CLASS_32 {
        return Err(ProcessError::BadElf);
    }
    if header.file_type != TYPE_EXEC {
        return Err(ProcessError::BadElf);
    }
    if header.instruction_set != ISA_NONE && header.instruction_set != ISA_X86 {
        return Err(ProcessError::BadElf);
    }
    Ok(header)
}

/// Checks whether `image` is a loadable ELF executable, without mapping anything.
pub fn elf_check(image: &[u8]) -> bool {
    header_of(image).is_ok()
}

/// Loads every `PT_LOAD` segment of `image` into `directory`, returning the entry point
/// and the list of mapped `(vaddr, memsz)` segments for later teardown.
pub fn elf_load(
    paging: &PagingManager,
    directory: &mut PageTable,
    image: &[u8],
) -> Result<(VirtAddr, Vec<LoadedSegment>), ProcessError> {
    let header = *header_of(image)?;
    let mut segments = Vec::new();

    let ph_base = header.program_header_table as usize;
    let ph_size = header.ph_entry_size as usize;
    for i in 0..header.ph_entry_count as usize {
        let off = ph_base + i * ph_size;
        if off + core::mem::size_of::<ElfProgramHeader32>() > image.len() {
            return Err(ProcessError::BadElf);
        }
        let ph: ElfProgramHeader32 =
            *bytemuck::from_bytes(&image[off..off + core::mem::size_of::<ElfProgramHeader32>()]);

        if ph.segment_type != PT_LOAD || ph.p_memsz == 0 {
            continue;
        }

        let vaddr = VirtAddr::new(ph.p_vaddr);
        paging
            .map_memory(directory, vaddr, ph.p_memsz, true, true)
            .map_err(|_| ProcessError::OutOfMemory)?;
        segments.push(LoadedSegment { vaddr, memsz: ph.p_memsz });

        let file_start = ph.p_offset as usize;
        let file_end = file_start + ph.p_filesz as usize;
        if file_end > image.len() {
            return Err(ProcessError::BadElf);
        }

        // SAFETY: the segment was just mapped writable+user in `directory`, which the
        // caller has already switched to (the byte copy happens in the target address
        // space, matching the original's `pd_switch`/`memcpy`/`pd_switch` sequence).
        unsafe {
            let dst = vaddr.as_mut_ptr::<u8>();
            core::ptr::copy_nonoverlapping(image[file_start..file_end].as_ptr(), dst, ph.p_filesz as usize);
            let tail = ph.p_memsz - ph.p_filesz;
            if tail > 0 {
                core::ptr::write_bytes(dst.add(ph.p_filesz as usize), 0, tail as usize);
            }
        }
    }

    Ok((VirtAddr::new(header.entry), segments))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header_bytes(class: u8, file_type: u16, isa: u16) -> Vec<u8> {
        let header = ElfHeader32 {
            magic: MAGIC,
            class,
            endianness: 1,
            version0: 1,
            unused: [0; 9],
            file_type,
            instruction_set: isa,
            version1: 1,
            entry: 0x1000,
            program_header_table: core::mem::size_of::<ElfHeader32>() as u32,
            section_header_table: 0,
            flags: 0,
            header_size: core::mem::size_of::<ElfHeader32>() as u16,
            ph_entry_size: core::mem::size_of::<ElfProgramHeader32>() as u16,
            ph_entry_count: 0,
            sh_entry_size: 0,
            sh_entry_count: 0,
            sh_index: 0,
        };
        bytemuck::bytes_of(&header).to_vec()
    }

    #[test]
    fn valid_32bit_exec_x86_header_passes() {
        assert!(elf_check(&header_bytes(CLASS_32, TYPE_EXEC, ISA_X86)));
    }

    #[test]
    fn wrong_class_is_rejected() {
        assert!(!elf_check(&header_bytes(2, TYPE_EXEC, ISA_X86)));
    }

    #[test]
    fn wrong_instruction_set_is_rejected() {
        assert!(!elf_check(&header_bytes(CLASS_32, TYPE_EXEC, 40)));
    }

    #[test]
    fn truncated_image_is_rejected() {
        assert!(!elf_check(&[0x7F, b'E', b'L', b'F']));
    }
}
