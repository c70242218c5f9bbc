//! Reading values and identifiers from the command line.

use crate::commands::PayloadArgs;
use stash_core::{CacheId, DataType, Payload};
use std::io::Read;
use std::path::Path;

/// Payload from an argument, a file, or stdin, validated against its type.
pub fn read_payload(args: &PayloadArgs) -> Result<Payload, Box<dyn std::error::Error>> {
    let bytes = match (&args.value, &args.file) {
        (Some(value), _) => value.clone().into_bytes(),
        (None, Some(path)) => read_file(path)?,
        (None, None) => {
            let mut buf = Vec::new();
            std::io::stdin().read_to_end(&mut buf)?;
            buf
        }
    };
    Ok(Payload::from_bytes(bytes, DataType::from(args.data_type))?)
}

fn read_file(path: &Path) -> Result<Vec<u8>, Box<dyn std::error::Error>> {
    std::fs::read(path).map_err(|e| format!("Could not read {}: {}", path.display(), e).into())
}

pub fn parse_id(value: &str) -> Result<CacheId, Box<dyn std::error::Error>> {
    Ok(value.parse::<CacheId>()?)
}
