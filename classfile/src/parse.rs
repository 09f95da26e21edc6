use byteorder::{BigEndian, ByteOrder};

/// A failure of the low-level byte cursor. Offsets are absolute positions in
/// the buffer the parser was created over.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, thiserror::Error)]
pub enum ParseError {
    #[error("unexpected end of input at offset {offset}: {needed} more byte(s) needed")]
    Incomplete { offset: usize, needed: usize },
    #[error("unexpected end of input")]
    IncompleteUnknown,
    #[error("unexpected byte at offset {0}")]
    Error(usize),
}

pub type ParseResult<T> = Result<T, ParseError>;

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct ByteParser<'src> {
    pub src: &'src [u8],
    pub offset: usize,
}

impl<'src> ByteParser<'src> {
    pub fn new(src: &'src [u8]) -> Self {
        ByteParser { src, offset: 0 }
    }

    /// Creates a parser positioned at `offset`. Reading past the end of `src`
    /// is an error, so callers bound a region by slicing `src` at its end.
    pub fn at(src: &'src [u8], offset: usize) -> Self {
        ByteParser { src, offset }
    }

    pub fn remaining(&self) -> usize {
        self.src.len().saturating_sub(self.offset)
    }

    fn incomplete(&self, len: usize) -> ParseError {
        ParseError::Incomplete {
            offset: self.offset,
            needed: len - self.remaining(),
        }
    }

    /// Tries to run the function, and backtracks by setting self to the state
    /// of the parser before the function was run if an error was returned.
    ///
    /// Running several parse functions in sequence without surrounding them in
    /// a call to `backtrace` can leave the head pointing into the middle of
    /// some production when a later one fails.
    pub fn backtrace<F, T, E>(&mut self, mut func: F) -> Result<T, E>
    where
        F: FnMut(&mut Self) -> Result<T, E>,
    {
        let start = *self;
        func(self).map_err(|err| {
            *self = start;
            err
        })
    }

    /// Takes `tag.len()` bytes and returns an error if the bytes did not match.
    pub fn expect(&mut self, tag: &[u8]) -> ParseResult<()> {
        self.backtrace(|p| {
            if p.remaining() < tag.len() {
                Err(p.incomplete(tag.len()))
            } else {
                for (i, &expected) in tag.iter().enumerate() {
                    if p.src[p.offset + i] != expected {
                        return Err(ParseError::Error(p.offset + i));
                    }
                }

                p.offset += tag.len();
                Ok(())
            }
        })
    }

    /// Takes `len` bytes, and errors if there were not enough bytes remaining.
    pub fn take(&mut self, len: usize) -> ParseResult<&'src [u8]> {
        if self.remaining() < len {
            Err(self.incomplete(len))
        } else {
            let res = &self.src[self.offset..self.offset + len];
            self.offset += len;
            Ok(res)
        }
    }

    pub fn skip(&mut self, len: usize) -> ParseResult<()> {
        self.take(len).map(|_| ())
    }

    pub fn predicate_len<F>(&self, mut func: F) -> usize
    where
        F: FnMut(u8) -> bool,
    {
        let mut len = 0;
        while self.remaining() - len > 0 {
            if !func(self.src[self.offset + len]) {
                break;
            }

            len += 1;
        }
        len
    }

    /// Takes bytes until a condition is no longer met. Note that `take_while`
    /// will consume the last inspected byte! That is,
    /// `ByteParser::new(b"aaaab").take_while(|c| c != b'b')` will consume the
    /// entire input! Additionally, the parser will return an error if the end
    /// of the input stream is reached while the predicate has not yet returned
    /// `false`.
    pub fn take_while<F>(&mut self, func: F) -> ParseResult<&'src [u8]>
    where
        F: FnMut(u8) -> bool,
    {
        let len = self.predicate_len(func);
        if self.remaining() - len == 0 {
            Err(ParseError::IncompleteUnknown)
        } else {
            let out = self.take(len)?;
            self.offset += 1;
            Ok(out)
        }
    }

    /// Like `take_while`, but doesn't consume the last inspected byte.
    pub fn peeking_take_while<F>(&mut self, func: F) -> ParseResult<&'src [u8]>
    where
        F: FnMut(u8) -> bool,
    {
        let len = self.predicate_len(func);
        if self.remaining() - len == 0 {
            Err(ParseError::IncompleteUnknown)
        } else {
            self.take(len)
        }
    }

    /// Constructs a vector of the results of `func` by repeatedly applying it
    /// until it returns an `Err`. This is like `<production>*`.
    pub fn repeat0<F, T, E>(&mut self, mut func: F) -> Vec<T>
    where
        F: FnMut(&mut Self) -> Result<T, E>,
    {
        let mut results = vec![];
        while let Ok(val) = self.backtrace(&mut func) {
            results.push(val);
        }
        results
    }

    /// Constructs a vector of the results of `func` by applying it once
    /// normally, and then operating like `repeat0` for the rest of the input.
    /// This is like `<production>+`.
    pub fn repeat1<F, T, E>(&mut self, mut func: F) -> Result<Vec<T>, E>
    where
        F: FnMut(&mut Self) -> Result<T, E>,
    {
        let mut results = vec![self.backtrace(&mut func)?];
        while let Ok(val) = self.backtrace(&mut func) {
            results.push(val);
        }
        Ok(results)
    }

    /// Like `take`, but does not advance the parser.
    pub fn peek(&self, len: usize) -> ParseResult<&'src [u8]> {
        if self.remaining() < len {
            Err(self.incomplete(len))
        } else {
            Ok(&self.src[self.offset..self.offset + len])
        }
    }

    /// Applies `func` exactly `len` times, and returns a vector of the items
    /// produced by `func`.
    pub fn seq<F, T, E>(&mut self, len: usize, mut func: F) -> Result<Vec<T>, E>
    where
        F: FnMut(&mut Self) -> Result<T, E>,
    {
        let mut vec = Vec::with_capacity(len);
        for _ in 0..len {
            vec.push(self.backtrace(&mut func)?);
        }
        Ok(vec)
    }

    pub fn parse_u8(&mut self) -> ParseResult<u8> {
        self.take(1).map(|b| b[0])
    }

    pub fn parse_u16(&mut self) -> ParseResult<u16> {
        self.take(2).map(BigEndian::read_u16)
    }

    pub fn parse_u32(&mut self) -> ParseResult<u32> {
        self.take(4).map(BigEndian::read_u32)
    }

    pub fn parse_u64(&mut self) -> ParseResult<u64> {
        self.take(8).map(BigEndian::read_u64)
    }

    pub fn parse_i8(&mut self) -> ParseResult<i8> {
        self.take(1).map(|b| b[0] as i8)
    }

    pub fn parse_i16(&mut self) -> ParseResult<i16> {
        self.take(2).map(BigEndian::read_i16)
    }

    pub fn parse_i32(&mut self) -> ParseResult<i32> {
        self.take(4).map(BigEndian::read_i32)
    }

    pub fn parse_i64(&mut self) -> ParseResult<i64> {
        self.take(8).map(BigEndian::read_i64)
    }

    pub fn parse_f32(&mut self) -> ParseResult<f32> {
        self.take(4).map(BigEndian::read_f32)
    }

    pub fn parse_f64(&mut self) -> ParseResult<f64> {
        self.take(8).map(BigEndian::read_f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pred_len() {
        let mut parser = ByteParser::new(b"abcdefgh");
        parser.expect(b"abcd").unwrap();
        assert_eq!(4, parser.predicate_len(|_| true));
    }

    #[test]
    fn take_while_valid() {
        let mut parser = ByteParser::new(b"foo.bar");
        assert_eq!(parser.take_while(|ch| ch != b'.'), Ok(&b"foo"[..]));
        assert_eq!(parser.remaining(), 3);
    }

    #[test]
    fn peeking_take_while_valid() {
        let mut parser = ByteParser::new(b"foo.bar");
        assert_eq!(parser.peeking_take_while(|ch| ch != b'.'), Ok(&b"foo"[..]));
        assert_eq!(parser.remaining(), 4);
    }

    #[test]
    fn take_while_invalid() {
        let mut parser = ByteParser::new(b"foo");
        assert_eq!(
            parser.take_while(|ch| ch != b'.'),
            Err(ParseError::IncompleteUnknown)
        );
    }

    #[test]
    fn truncated_read_reports_offset() {
        let mut parser = ByteParser::at(&[0xca, 0xfe, 0xba], 1);
        assert_eq!(
            parser.parse_u32(),
            Err(ParseError::Incomplete {
                offset: 1,
                needed: 2
            })
        );
        assert_eq!(parser.offset, 1);
    }

    #[test]
    fn big_endian_scalars() {
        let mut parser = ByteParser::new(&[0xff, 0xfe, 0x3f, 0x80, 0x00, 0x00]);
        assert_eq!(parser.parse_i16(), Ok(-2));
        assert_eq!(parser.parse_f32(), Ok(1.0));
        assert_eq!(parser.remaining(), 0);
    }

    #[test]
    fn failed_expect_backtracks() {
        let mut parser = ByteParser::new(b"LFoo;");
        assert_eq!(parser.expect(b"LBar"), Err(ParseError::Error(1)));
        assert_eq!(parser.offset, 0);
    }
}
