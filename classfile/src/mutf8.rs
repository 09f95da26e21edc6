//! The modified UTF-8 encoding used by `CONSTANT_Utf8` entries: NUL is written
//! as the overlong pair `c0 80`, and supplementary characters are written as
//! two three-byte encoded surrogates.

use crate::{parse::ByteParser, ClassError, ClassResult};
use std::borrow::Cow;

/// Copies items into a `Cow`, staying borrowed for as long as the output
/// matches the input stream.
pub struct CowBuilder<'a, T>
where
    [T]: ToOwned,
{
    cow: Cow<'a, [T]>,
    pos: usize,
}

impl<'a, T> CowBuilder<'a, T>
where
    [T]: ToOwned,
{
    pub fn new<C: Into<Cow<'a, [T]>>>(cow: C) -> Self {
        CowBuilder {
            cow: cow.into(),
            pos: 0,
        }
    }

    pub fn into_inner(self) -> Cow<'a, [T]> {
        match self.cow {
            Cow::Borrowed(slice) => Cow::Borrowed(&slice[..self.pos]),
            owned => owned,
        }
    }
}

impl<T> Extend<T> for CowBuilder<'_, T>
where
    [T]: ToOwned,
    <[T] as ToOwned>::Owned: Extend<T>,
    T: PartialEq + Clone,
{
    fn extend<I>(&mut self, iter: I)
    where
        I: IntoIterator<Item = T>,
    {
        for item in iter.into_iter() {
            self.push(item);
        }
    }
}

impl<'a, T> CowBuilder<'a, T>
where
    [T]: ToOwned,
    <[T] as ToOwned>::Owned: Extend<T>,
    T: PartialEq + Clone,
{
    pub fn push(&mut self, item: T) {
        match &mut self.cow {
            Cow::Owned(vec) => {
                vec.extend(std::iter::once(item));
                return;
            }

            Cow::Borrowed(slice) => {
                if slice.get(self.pos) == Some(&item) {
                    self.pos += 1;
                    return;
                }
            }
        }

        // Out of sync with the input, so copy what matched so far.
        self.cow = Cow::Owned({
            let mut owned = self.cow[..self.pos].to_owned();
            owned.extend(std::iter::once(item));
            owned
        });
    }
}

fn is_continuation(byte: u8) -> bool {
    byte & 0xc0 == 0x80
}

/// Decodes modified UTF-8, borrowing from `bytes` when no re-encoding is
/// needed.
pub fn parse_mutf8(bytes: &[u8]) -> ClassResult<Cow<'_, str>> {
    let mut parser = ByteParser::new(bytes);
    let mut builder = CowBuilder::new(bytes);

    macro_rules! invalid {
        ($byte:expr) => {
            return Err(ClassError::InvalidModifiedUtf8Byte(parser.offset - 1, $byte))
        };
    }

    while parser.remaining() > 0 {
        let b1 = parser.parse_u8()?;
        if b1 == 0 || b1 >= 0xf0 {
            invalid!(b1);
        }

        if b1 & 0x80 == 0 {
            // 0xxxxxxx
            builder.push(b1);
        } else if b1 & 0xe0 == 0xc0 {
            // 110xxxxx 10xxxxxx
            let b2 = parser.parse_u8()?;
            if !is_continuation(b2) {
                invalid!(b2);
            }

            if b1 == 0xc0 && b2 == 0x80 {
                builder.push(0);
            } else if b1 < 0xc2 {
                invalid!(b2);
            } else {
                builder.push(b1);
                builder.push(b2);
            }
        } else if b1 == 0xed && parser.peek(1).map(|b| b[0] & 0xf0 == 0xa0).unwrap_or(false) {
            // 11101101 1010xxxx 10xxxxxx 11101101 1011yyyy 10yyyyyy
            let b2 = parser.parse_u8()?;
            let b3 = parser.parse_u8()?;
            if !is_continuation(b3) {
                invalid!(b3);
            }

            let b4 = parser.parse_u8()?;
            if b4 != 0xed {
                invalid!(b4);
            }

            let b5 = parser.parse_u8()?;
            if b5 & 0xf0 != 0xb0 {
                invalid!(b5);
            }

            let b6 = parser.parse_u8()?;
            if !is_continuation(b6) {
                invalid!(b6);
            }

            let scalar = 0x10000
                + ((b2 as u32 & 0x0f) << 16)
                + ((b3 as u32 & 0x3f) << 10)
                + ((b5 as u32 & 0x0f) << 6)
                + (b6 as u32 & 0x3f);
            let scalar = match std::char::from_u32(scalar) {
                Some(ch) => ch,
                None => invalid!(b6),
            };

            let mut utf8 = [0; 4];
            builder.extend(scalar.encode_utf8(&mut utf8).bytes());
        } else if b1 & 0xf0 == 0xe0 {
            // 1110xxxx 10xxxxxx 10xxxxxx
            let b2 = parser.parse_u8()?;
            if !is_continuation(b2) || (b1 == 0xe0 && b2 < 0xa0) || (b1 == 0xed && b2 >= 0xa0) {
                invalid!(b2);
            }

            let b3 = parser.parse_u8()?;
            if !is_continuation(b3) {
                invalid!(b3);
            }

            builder.push(b1);
            builder.push(b2);
            builder.push(b3);
        } else {
            invalid!(b1);
        }
    }

    // Every branch above pushed well-formed UTF-8.
    Ok(match builder.into_inner() {
        Cow::Owned(vec) => Cow::Owned(String::from_utf8(vec).map_err(|err| {
            ClassError::InvalidModifiedUtf8Byte(err.utf8_error().valid_up_to(), 0)
        })?),
        Cow::Borrowed(slice) => Cow::Borrowed(std::str::from_utf8(slice).map_err(|err| {
            ClassError::InvalidModifiedUtf8Byte(err.valid_up_to(), slice[err.valid_up_to()])
        })?),
    })
}

/// Encodes a string as modified UTF-8, borrowing when the standard encoding
/// is already valid.
pub fn encode_mutf8(text: &str) -> Cow<'_, [u8]> {
    let mut builder = CowBuilder::new(text.as_bytes());
    for ch in text.chars() {
        match ch as u32 {
            0 => builder.extend([0xc0, 0x80].iter().cloned()),
            scalar if scalar >= 0x10000 => {
                let mut units = [0; 2];
                for unit in ch.encode_utf16(&mut units).iter() {
                    builder.push(0xe0 | (unit >> 12) as u8);
                    builder.push(0x80 | ((unit >> 6) & 0x3f) as u8);
                    builder.push(0x80 | (unit & 0x3f) as u8);
                }
            }
            _ => {
                let mut utf8 = [0; 4];
                builder.extend(ch.encode_utf8(&mut utf8).bytes());
            }
        }
    }
    builder.into_inner()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normal_text_is_borrowed() {
        let string = "Hello, world!";
        assert!(matches!(parse_mutf8(string.as_bytes()), Ok(Cow::Borrowed(text)) if text == string));
    }

    #[test]
    fn non_latin_text_is_borrowed() {
        let string = "Здравствуй, мир";
        assert!(matches!(parse_mutf8(string.as_bytes()), Ok(Cow::Borrowed(text)) if text == string));
    }

    #[test]
    fn supplementary() {
        let string = &[0x41, 0xed, 0xa0, 0xb4, 0xed, 0xbc, 0xb9];
        assert!(matches!(parse_mutf8(string), Ok(Cow::Owned(text)) if text == "A𝌹"));
    }

    #[test]
    fn overlong_nul() {
        let string = b"foo\xc0\x80bar\xc0\x80baz";
        assert_eq!(parse_mutf8(string).unwrap(), "foo\0bar\0baz");
    }

    #[test]
    fn bare_nul_is_rejected() {
        let string = b"foo\0bar";
        assert!(matches!(
            parse_mutf8(string),
            Err(ClassError::InvalidModifiedUtf8Byte(3, 0))
        ));
    }

    #[test]
    fn bmp_characters_near_the_surrogate_range() {
        let string = "\u{d7ff}\u{e000}";
        assert_eq!(parse_mutf8(string.as_bytes()).unwrap(), string);
    }

    #[test]
    fn encoding_reverses_decoding() {
        assert!(matches!(encode_mutf8("plain"), Cow::Borrowed(b"plain")));
        assert_eq!(&*encode_mutf8("a\0b"), b"a\xc0\x80b");
        assert_eq!(&*encode_mutf8("A𝌹"), &[0x41, 0xed, 0xa0, 0xb4, 0xed, 0xbc, 0xb9]);
        assert_eq!(parse_mutf8(&encode_mutf8("x\0𝌹y")).unwrap(), "x\0𝌹y");
    }
}
