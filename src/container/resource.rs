use std::borrow::Cow;
use std::io::{Cursor, Read, Seek, SeekFrom};

/// A raw bundle entry (`.resS` / `.resource`) that texture and audio objects point into.
pub trait ResourceStream: Read + Seek {
    fn len(&self) -> u64;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn position(&self) -> u64;

    /// The bytes written back into the bundle.
    fn serialize(&self) -> Cow<'_, [u8]>;
}

/// The entry as it was read from the bundle.
#[derive(Debug, Clone)]
pub struct PassThrough {
    data: Cursor<Vec<u8>>,
}
impl PassThrough {
    pub fn new(data: Vec<u8>) -> Self {
        PassThrough {
            data: Cursor::new(data),
        }
    }
}

/// A rebuilt entry. Keeps the original around so it can be replaced again from scratch.
#[derive(Debug, Clone)]
pub struct Replaced {
    original: PassThrough,
    buffer: Cursor<Vec<u8>>,
}
impl Replaced {
    pub fn original(&self) -> &PassThrough {
        &self.original
    }
}

macro_rules! impl_stream {
    ($ty:ty, $field:ident) => {
        impl Read for $ty {
            fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
                self.$field.read(buf)
            }
        }
        impl Seek for $ty {
            fn seek(&mut self, pos: SeekFrom) -> std::io::Result<u64> {
                self.$field.seek(pos)
            }
        }
        impl ResourceStream for $ty {
            fn len(&self) -> u64 {
                self.$field.get_ref().len() as u64
            }

            fn position(&self) -> u64 {
                self.$field.position()
            }

            fn serialize(&self) -> Cow<'_, [u8]> {
                Cow::Borrowed(self.$field.get_ref())
            }
        }
    };
}
impl_stream!(PassThrough, data);
impl_stream!(Replaced, buffer);

#[derive(Debug, Clone)]
pub enum Resource {
    Original(PassThrough),
    Replaced(Replaced),
}

impl Resource {
    pub fn original(data: Vec<u8>) -> Resource {
        Resource::Original(PassThrough::new(data))
    }

    pub fn is_replaced(&self) -> bool {
        matches!(self, Resource::Replaced(_))
    }

    /// Swaps the contents for `data`. Replacing twice discards the first replacement.
    pub fn replace(&mut self, data: Vec<u8>) {
        let placeholder = Resource::original(Vec::new());
        let original = match std::mem::replace(self, placeholder) {
            Resource::Original(original) => original,
            Resource::Replaced(replaced) => replaced.original,
        };
        *self = Resource::Replaced(Replaced {
            original,
            buffer: Cursor::new(data),
        });
    }

    pub fn stream(&self) -> &dyn ResourceStream {
        match self {
            Resource::Original(stream) => stream,
            Resource::Replaced(stream) => stream,
        }
    }

    pub fn stream_mut(&mut self) -> &mut dyn ResourceStream {
        match self {
            Resource::Original(stream) => stream,
            Resource::Replaced(stream) => stream,
        }
    }

    pub fn len(&self) -> u64 {
        self.stream().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn serialize(&self) -> Cow<'_, [u8]> {
        self.stream().serialize()
    }

    /// Reads `len` bytes at `offset`, as a texture's stream window would.
    pub fn read_window(&mut self, offset: u64, len: usize) -> std::io::Result<Vec<u8>> {
        let stream = self.stream_mut();
        stream.seek(SeekFrom::Start(offset))?;
        let mut buf = vec![0; len];
        stream.read_exact(&mut buf)?;
        Ok(buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pass_through_reads_original() {
        let mut resource = Resource::original((0..16).collect());
        assert_eq!(resource.len(), 16);
        assert!(!resource.is_replaced());
        assert_eq!(resource.read_window(4, 3).unwrap(), [4, 5, 6]);
        assert_eq!(resource.stream().position(), 7);
        assert_eq!(resource.serialize().len(), 16);
    }

    #[test]
    fn replacement_owns_new_buffer() {
        let mut resource = Resource::original(vec![1; 32]);
        resource.replace(vec![2; 8]);
        assert!(resource.is_replaced());
        assert_eq!(resource.len(), 8);
        assert_eq!(&*resource.serialize(), &[2; 8]);

        resource.replace(vec![3; 4]);
        let Resource::Replaced(replaced) = &resource else {
            panic!("expected replaced resource");
        };
        assert_eq!(replaced.original().len(), 32);
        assert_eq!(resource.read_window(0, 4).unwrap(), [3; 4]);
        assert!(resource.read_window(2, 4).is_err());
    }
}
