//! Content encodings for binary payloads.
//!
//! Encoded uploads are stored as received; these helpers decode them for
//! hashing and for callers that want the original bytes back.

use stash_core::{ContentEncoding, Error, Result};
use std::io::{Read, Write};

/// Encode data with the given content encoding.
pub fn encode(data: &[u8], encoding: ContentEncoding) -> Result<Vec<u8>> {
    match encoding {
        ContentEncoding::Zstd => compress_zstd(data),
        ContentEncoding::Gzip => compress_gzip(data),
        ContentEncoding::Lz4 => Ok(lz4_flex::compress_prepend_size(data)),
    }
}

/// Decode data produced with the given content encoding.
pub fn decode(data: &[u8], encoding: ContentEncoding) -> Result<Vec<u8>> {
    match encoding {
        ContentEncoding::Zstd => decompress_zstd(data),
        ContentEncoding::Gzip => decompress_gzip(data),
        ContentEncoding::Lz4 => lz4_flex::decompress_size_prepended(data)
            .map_err(|e| Error::InvalidPayload(format!("LZ4 decompression failed: {}", e))),
    }
}

fn compress_zstd(data: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = zstd::Encoder::new(Vec::new(), 3)
        .map_err(|e| Error::Internal(format!("Zstd compression failed: {}", e)))?;
    encoder
        .write_all(data)
        .map_err(|e| Error::Internal(format!("Zstd write failed: {}", e)))?;
    encoder
        .finish()
        .map_err(|e| Error::Internal(format!("Zstd finish failed: {}", e)))
}

fn decompress_zstd(data: &[u8]) -> Result<Vec<u8>> {
    let mut decoder = zstd::Decoder::new(data)
        .map_err(|e| Error::InvalidPayload(format!("Zstd decompression failed: {}", e)))?;
    let mut output = Vec::new();
    decoder
        .read_to_end(&mut output)
        .map_err(|e| Error::InvalidPayload(format!("Zstd read failed: {}", e)))?;
    Ok(output)
}

fn compress_gzip(data: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
    encoder
        .write_all(data)
        .map_err(|e| Error::Internal(format!("Gzip write failed: {}", e)))?;
    encoder
        .finish()
        .map_err(|e| Error::Internal(format!("Gzip finish failed: {}", e)))
}

fn decompress_gzip(data: &[u8]) -> Result<Vec<u8>> {
    let mut decoder = flate2::read::GzDecoder::new(data);
    let mut output = Vec::new();
    decoder
        .read_to_end(&mut output)
        .map_err(|e| Error::InvalidPayload(format!("Gzip read failed: {}", e)))?;
    Ok(output)
}
