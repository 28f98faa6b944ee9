use std::io::Read;

use simvault_types::Location;

use crate::backend::BackendStream;
use crate::error::StoreResult;

/// A validated read handle that can only be consumed inside a closure.
///
/// Backends may hold file descriptors or connections behind a stream, so
/// the reader is never handed out by value. [`ScopedStream::with`] lends it
/// to a closure and drops it when the closure returns, unwinds, or errors;
/// a `ScopedStream` that is never consumed releases the reader on drop.
pub struct ScopedStream {
    location: Location,
    reader: BackendStream,
}

impl ScopedStream {
    pub(crate) fn new(location: Location, reader: BackendStream) -> Self {
        Self { location, reader }
    }

    /// The location this stream reads from.
    pub fn location(&self) -> &Location {
        &self.location
    }

    /// Lend the reader to `f`, releasing it afterwards.
    pub fn with<T, F>(mut self, f: F) -> StoreResult<T>
    where
        F: FnOnce(&mut dyn Read) -> std::io::Result<T>,
    {
        Ok(f(&mut *self.reader)?)
    }

    /// Read the entire stream into memory.
    pub fn read_to_vec(self) -> StoreResult<Vec<u8>> {
        self.with(|reader| {
            let mut buf = Vec::new();
            reader.read_to_end(&mut buf)?;
            Ok(buf)
        })
    }

    /// Read the entire stream as UTF-8 text.
    pub fn read_to_string(self) -> StoreResult<String> {
        self.with(|reader| {
            let mut buf = String::new();
            reader.read_to_string(&mut buf)?;
            Ok(buf)
        })
    }
}

impl std::fmt::Debug for ScopedStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScopedStream")
            .field("location", &self.location)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{self, Cursor};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    use crate::error::StoreError;

    /// Reader that records when it is dropped.
    struct TrackedReader {
        inner: Cursor<Vec<u8>>,
        released: Arc<AtomicBool>,
    }

    impl Read for TrackedReader {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            self.inner.read(buf)
        }
    }

    impl Drop for TrackedReader {
        fn drop(&mut self) {
            self.released.store(true, Ordering::SeqCst);
        }
    }

    fn tracked(data: &[u8]) -> (ScopedStream, Arc<AtomicBool>) {
        let released = Arc::new(AtomicBool::new(false));
        let reader = TrackedReader {
            inner: Cursor::new(data.to_vec()),
            released: Arc::clone(&released),
        };
        (
            ScopedStream::new(Location::new("t"), Box::new(reader)),
            released,
        )
    }

    #[test]
    fn with_reads_and_releases() {
        let (stream, released) = tracked(b"abc");
        let len = stream
            .with(|r| {
                let mut buf = Vec::new();
                r.read_to_end(&mut buf)?;
                Ok(buf.len())
            })
            .unwrap();
        assert_eq!(len, 3);
        assert!(released.load(Ordering::SeqCst));
    }

    #[test]
    fn releases_on_error_path() {
        let (stream, released) = tracked(b"abc");
        let result: StoreResult<()> =
            stream.with(|_| Err(io::Error::new(io::ErrorKind::Other, "boom")));
        assert!(matches!(result, Err(StoreError::Io(_))));
        assert!(released.load(Ordering::SeqCst));
    }

    #[test]
    fn releases_on_panic() {
        let (stream, released) = tracked(b"abc");
        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _ = stream.with(|_| -> io::Result<()> { panic!("consumer failed") });
        }));
        assert!(outcome.is_err());
        assert!(released.load(Ordering::SeqCst));
    }

    #[test]
    fn releases_when_dropped_unused() {
        let (stream, released) = tracked(b"abc");
        drop(stream);
        assert!(released.load(Ordering::SeqCst));
    }

    #[test]
    fn read_helpers() {
        let (stream, _) = tracked(b"hello");
        assert_eq!(stream.read_to_vec().unwrap(), b"hello");
        let (stream, _) = tracked(b"hello");
        assert_eq!(stream.read_to_string().unwrap(), "hello");
    }
}
