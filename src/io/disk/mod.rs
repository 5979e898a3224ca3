pub mod bios;
