// Splits a firmware image into ordered, fixed-size chunks.

use crate::firmware::FirmwareImage;

/// One contiguous slice of the image, sent as a single write.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Chunk<'a> {
    pub index: usize,
    pub offset: usize,
    pub data: &'a [u8],
}

impl Chunk<'_> {
    /// Offset one past the last byte of this chunk.
    pub fn end(&self) -> usize {
        self.offset + self.data.len()
    }
}

/// Lazy pass over an image. Each call to [`chunks`] starts again at offset 0.
pub struct Chunks<'a> {
    inner: std::iter::Enumerate<std::slice::Chunks<'a, u8>>,
    chunk_size: usize,
}

impl<'a> Iterator for Chunks<'a> {
    type Item = Chunk<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let (index, data) = self.inner.next()?;
        Some(Chunk {
            index,
            offset: index * self.chunk_size,
            data,
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl ExactSizeIterator for Chunks<'_> {}

/// Iterate `image` in `chunk_size` pieces. The last chunk may be shorter.
///
/// Panics if `chunk_size` is zero; `OtaConfig::validate` rules that out.
pub fn chunks(image: &FirmwareImage, chunk_size: usize) -> Chunks<'_> {
    assert!(chunk_size > 0, "chunk size must be non-zero");
    Chunks {
        inner: image.bytes().chunks(chunk_size).enumerate(),
        chunk_size,
    }
}

/// Number of chunks `size` bytes split into.
pub fn total_chunks(size: usize, chunk_size: usize) -> usize {
    size.div_ceil(chunk_size)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image_of(size: usize) -> FirmwareImage {
        FirmwareImage::from_bytes((0..size).map(|i| (i % 251) as u8).collect())
    }

    #[test]
    fn test_chunk_layout_for_various_sizes() {
        const C: usize = 512;
        for size in [0, 1, 511, 512, 513, 1024, 1500, 4096, 10_000] {
            let image = image_of(size);
            let all: Vec<Chunk> = chunks(&image, C).collect();

            assert_eq!(all.len(), size.div_ceil(C), "chunk count for size {size}");
            assert_eq!(all.len(), total_chunks(size, C));

            for (i, chunk) in all.iter().enumerate() {
                assert_eq!(chunk.index, i);
                assert_eq!(chunk.offset, i * C);
            }

            if let Some(last) = all.last() {
                let expected = if size % C == 0 { C } else { size % C };
                assert_eq!(last.data.len(), expected, "last chunk for size {size}");
                assert_eq!(last.end(), size);
            }

            let joined: Vec<u8> = all.iter().flat_map(|c| c.data.iter().copied()).collect();
            assert_eq!(joined, image.bytes(), "reassembly for size {size}");
        }
    }

    #[test]
    fn test_each_call_is_a_fresh_pass() {
        let image = image_of(1300);
        let mut first = chunks(&image, 512);
        first.next();
        first.next();

        let again: Vec<Chunk> = chunks(&image, 512).collect();
        assert_eq!(again.len(), 3);
        assert_eq!(again[0].offset, 0);
    }

    #[test]
    fn test_exact_size() {
        let image = image_of(2049);
        let iter = chunks(&image, 512);
        assert_eq!(iter.len(), 5);
    }

    #[test]
    #[should_panic(expected = "chunk size must be non-zero")]
    fn test_zero_chunk_size_panics() {
        let image = image_of(10);
        let _ = chunks(&image, 0);
    }
}
