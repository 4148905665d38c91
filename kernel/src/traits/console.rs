/// Byte sink for kernel text output.
pub trait Console {
    fn put_byte(&self, byte: u8);

    /// Writes `bytes`, turning `\n` into `\r\n`.
    fn write_bytes(&self, bytes: &[u8]) {
        for &byte in bytes {
            if byte == b'\n' {
                self.put_byte(b'\r');
            }
            self.put_byte(byte);
        }
    }
}
