//! Payload builder, the write-side mirror of [`Cursor`](super::cursor::Cursor).

#[derive(Debug, Default, Clone)]
pub struct PayloadWriter {
    buf: Vec<u8>,
}

impl PayloadWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
        }
    }

    pub fn put(&mut self, bytes: &[u8]) -> &mut Self {
        self.buf.extend_from_slice(bytes);
        self
    }

    pub fn put_u8(&mut self, value: u8) -> &mut Self {
        self.buf.push(value);
        self
    }

    pub fn put_u16(&mut self, value: u16) -> &mut Self {
        self.put(&value.to_le_bytes())
    }

    pub fn put_u32(&mut self, value: u32) -> &mut Self {
        self.put(&value.to_le_bytes())
    }

    pub fn put_i32(&mut self, value: i32) -> &mut Self {
        self.put(&value.to_le_bytes())
    }

    pub fn put_u64(&mut self, value: u64) -> &mut Self {
        self.put(&value.to_le_bytes())
    }

    pub fn put_var_int(&mut self, value: u64) -> &mut Self {
        match value {
            0..=0xFC => self.put_u8(value as u8),
            0xFD..=0xFFFF => self.put_u8(0xFD).put_u16(value as u16),
            0x1_0000..=0xFFFF_FFFF => self.put_u8(0xFE).put_u32(value as u32),
            _ => self.put_u8(0xFF).put_u64(value),
        }
    }

    pub fn put_var_bytes(&mut self, bytes: &[u8]) -> &mut Self {
        self.put_var_int(bytes.len() as u64).put(bytes)
    }

    pub fn put_var_string(&mut self, value: &str) -> &mut Self {
        self.put_var_bytes(value.as_bytes())
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.buf
    }
}
