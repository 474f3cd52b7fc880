pub type Byte = u8;
pub type Word = u16;
pub type Long = u32;
