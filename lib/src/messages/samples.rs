//! IQ sample extraction from data message bodies.

use std::slice::ChunksExact;

use crate::errors::SampleError;

/// Lazy sequence of samples cut from a data message body.
///
/// Every full `bytes_per_sample` chunk yields one sample, read little-endian
/// and zero-extended into an `i32`. A trailing partial chunk is dropped.
#[derive(Debug)]
pub struct Samples<'a> {
    chunks: ChunksExact<'a, u8>,
}

impl Iterator for Samples<'_> {
    type Item = i32;

    fn next(&mut self) -> Option<i32> {
        self.chunks.next().map(|chunk| {
            let mut buf = [0u8; 4];
            buf[..chunk.len()].copy_from_slice(chunk);
            i32::from_le_bytes(buf)
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.chunks.size_hint()
    }
}

impl ExactSizeIterator for Samples<'_> {}

/// Splits `body` into samples of `bit_width` bits.
///
/// # Errors
/// Returns [`SampleError::InvalidSampleSize`] unless `bit_width / 8` is between 1 and 4.
pub fn extract_samples(bit_width: u16, body: &[u8]) -> Result<Samples<'_>, SampleError> {
    let bytes_per_sample = usize::from(bit_width / 8);
    if !(1..=4).contains(&bytes_per_sample) {
        return Err(SampleError::InvalidSampleSize(bit_width));
    }
    Ok(Samples {
        chunks: body.chunks_exact(bytes_per_sample),
    })
}
