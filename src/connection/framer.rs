use super::{ConnectionError, TELEGRAM_TERMINATOR};
use log::debug;

/// Reassembles telegrams from arbitrarily split reads.
///
/// A frame ends with the terminator byte. Whatever follows it stays buffered
/// and becomes the start of the next frame.
pub struct TelegramFramer {
    buffer: Vec<u8>,
    max_len: usize,
}

impl TelegramFramer {
    pub fn new(max_len: usize) -> Self {
        TelegramFramer {
            buffer: Vec::new(),
            max_len,
        }
    }

    /// Append one chunk and return every frame completed by it.
    ///
    /// If the buffer grows past `max_len` without a terminator it is dropped
    /// and `TelegramTooLong` is returned once; framing then starts over.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Result<String, ConnectionError>> {
        let mut frames = Vec::new();
        self.buffer.extend_from_slice(chunk);

        while let Some(pos) = self.buffer.iter().position(|b| *b == TELEGRAM_TERMINATOR) {
            let frame: Vec<u8> = self.buffer.drain(..=pos).collect();
            frames.push(Ok(latin1_to_string(&frame)));
        }

        if self.buffer.len() > self.max_len {
            debug!("Dropping {} buffered bytes without terminator", self.buffer.len());
            self.buffer.clear();
            frames.push(Err(ConnectionError::TelegramTooLong(self.max_len)));
        }

        frames
    }

    pub fn buffered(&self) -> &[u8] {
        &self.buffer
    }

    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}

/// P1 ports speak Latin-1, every byte is one character
pub fn latin1_to_string(bytes: &[u8]) -> String {
    bytes.iter().map(|b| char::from(*b)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ok_frames(frames: Vec<Result<String, ConnectionError>>) -> Vec<String> {
        frames.into_iter().map(|f| f.unwrap()).collect()
    }

    #[test]
    fn test_single_chunk() {
        let mut framer = TelegramFramer::new(1024);
        let frames = ok_frames(framer.push(b"/ISK5\r\n1-0:1.8.1(1*kWh)\r\n!"));
        assert_eq!(frames, vec!["/ISK5\r\n1-0:1.8.1(1*kWh)\r\n!".to_string()]);
        assert!(framer.buffered().is_empty());
    }

    #[test]
    fn test_split_chunks_keep_remainder() {
        let mut framer = TelegramFramer::new(1024);

        assert!(framer.push(b"/ISK5\r\n1-0:1.").is_empty());
        assert!(framer.push(b"8.1(1*kWh)\r\n").is_empty());

        let frames = ok_frames(framer.push(b"!A1B2\r\n/ISK5\r\n1-0"));
        assert_eq!(frames, vec!["/ISK5\r\n1-0:1.8.1(1*kWh)\r\n!".to_string()]);
        assert_eq!(framer.buffered(), b"A1B2\r\n/ISK5\r\n1-0");

        let frames = ok_frames(framer.push(b":1.8.1(2*kWh)\r\n!"));
        assert_eq!(frames, vec!["A1B2\r\n/ISK5\r\n1-0:1.8.1(2*kWh)\r\n!".to_string()]);
    }

    #[test]
    fn test_multiple_frames_in_one_chunk() {
        let mut framer = TelegramFramer::new(1024);
        let frames = ok_frames(framer.push(b"/A\r\n!\r\n/B\r\n!\r\n"));
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[1], "\r\n/B\r\n!");
        assert_eq!(framer.buffered(), b"\r\n");
    }

    #[test]
    fn test_overflow_discards_buffer() {
        let mut framer = TelegramFramer::new(8);
        let frames = framer.push(b"0123456789");

        assert_eq!(frames.len(), 1);
        assert!(matches!(frames[0], Err(ConnectionError::TelegramTooLong(8))));
        assert!(framer.buffered().is_empty());

        let frames = ok_frames(framer.push(b"/A\r\n!"));
        assert_eq!(frames, vec!["/A\r\n!".to_string()]);
    }

    #[test]
    fn test_latin1_bytes() {
        assert_eq!(latin1_to_string(&[0x2F, 0xE9, 0x21]), "/\u{e9}!");
    }
}
