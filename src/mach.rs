// Functions related to on-disk encoding.
use byteorder::{ByteOrder, LittleEndian};

// dBase-family files store all multi-byte values little-endian.
// The least significant byte is at the lowest address.
type E = LittleEndian;

pub fn read_2(buf: &[u8]) -> u16 {
    E::read_u16(buf)
}

pub fn read_4(buf: &[u8]) -> u32 {
    E::read_u32(buf)
}

pub fn read_8(buf: &[u8]) -> u64 {
    E::read_u64(buf)
}

pub fn read_i2(buf: &[u8]) -> i16 {
    E::read_i16(buf)
}

pub fn read_i4(buf: &[u8]) -> i32 {
    E::read_i32(buf)
}

pub fn read_f8(buf: &[u8]) -> f64 {
    E::read_f64(buf)
}

pub fn write_2(buf: &mut [u8], v: u16) {
    E::write_u16(buf, v)
}

pub fn write_4(buf: &mut [u8], v: u32) {
    E::write_u32(buf, v)
}

pub fn write_8(buf: &mut [u8], v: u64) {
    E::write_u64(buf, v)
}

pub fn write_i2(buf: &mut [u8], v: i16) {
    E::write_i16(buf, v)
}

pub fn write_i4(buf: &mut [u8], v: i32) {
    E::write_i32(buf, v)
}

pub fn write_f8(buf: &mut [u8], v: f64) {
    E::write_f64(buf, v)
}
