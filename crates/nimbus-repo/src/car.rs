//! CAR (Content Addressable aRchive) v1 file format.
//!
//! Layout: a varint-length-prefixed DAG-CBOR header `{version: 1, roots}`,
//! then repeated `(varint length, CID, block bytes)` frames. Reading treats
//! each frame as opaque bytes; [`CarFile::blocks_with_cids`] splits the
//! leading CID out when callers need it.

use std::collections::BTreeMap;
use std::io::Read;

use ciborium::Value as CborValue;

use nimbus_common::cid::{Cid, CidLink};
use nimbus_common::{Error, Result};

/// A CAR file as an in-memory value.
#[derive(Debug, Clone, Default)]
pub struct CarFile {
    /// Root CIDs named by the header.
    pub roots: Vec<CidLink>,
    /// Frame bytes keyed by stable `block-N` labels; iteration order is
    /// the write order.
    pub blocks: BTreeMap<String, Vec<u8>>,
}

/// A block frame split into its CID and payload.
#[derive(Debug, Clone)]
pub struct CarBlock {
    /// Content identifier.
    pub cid: Cid,
    /// Block payload.
    pub data: Vec<u8>,
}

impl CarFile {
    /// Creates an empty CAR file.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a raw frame (CID bytes followed by payload) under the next
    /// `block-N` label.
    pub fn add_block(&mut self, frame: Vec<u8>) -> String {
        let label = format!("block-{}", self.blocks.len());
        self.blocks.insert(label.clone(), frame);
        label
    }

    /// Appends a block by CID and payload.
    pub fn push_block(&mut self, cid: &Cid, data: &[u8]) -> String {
        let mut frame = cid.to_bytes();
        frame.extend_from_slice(data);
        self.add_block(frame)
    }

    /// Serializes the CAR file.
    ///
    /// The header is the DAG-CBOR map `{roots, version}` prefixed by its
    /// varint length (17 bytes for empty roots); frames follow in
    /// ascending label order, each prefixed by its varint length.
    ///
    /// # Errors
    /// Returns an error if header encoding fails.
    pub fn write(&self) -> Result<Vec<u8>> {
        let header = encode_header(&self.roots)?;

        let mut out = Vec::new();
        write_varint(&mut out, header.len() as u64);
        out.extend_from_slice(&header);

        for frame in self.blocks.values() {
            write_varint(&mut out, frame.len() as u64);
            out.extend_from_slice(frame);
        }

        Ok(out)
    }

    /// Parses a CAR file, labeling frames `block-0`, `block-1`, …
    ///
    /// The header bytes are skipped; block retrieval does not need them.
    ///
    /// # Errors
    /// Returns a repository error on truncated or undersized input.
    pub fn read(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < 2 {
            return Err(Error::Repository("CAR data too small".into()));
        }

        let mut reader = bytes;
        let header_len = read_varint(&mut reader)?
            .ok_or_else(|| Error::Repository("CAR data too small".into()))?;
        skip_bytes(&mut reader, header_len as usize)?;

        let mut car = Self::new();
        while let Some(frame_len) = read_varint(&mut reader)? {
            let mut frame = vec![0u8; frame_len as usize];
            reader
                .read_exact(&mut frame)
                .map_err(|_| Error::Repository("truncated CAR block".into()))?;
            car.add_block(frame);
        }

        Ok(car)
    }

    /// Splits every frame into its CID and payload.
    ///
    /// # Errors
    /// Returns an error if a frame does not start with a valid CID.
    pub fn blocks_with_cids(&self) -> Result<Vec<CarBlock>> {
        self.blocks
            .values()
            .map(|frame| {
                let (cid, cid_len) = Cid::from_bytes_with_len(frame)
                    .map_err(|e| Error::Repository(format!("bad block CID: {e}")))?;
                Ok(CarBlock {
                    cid,
                    data: frame[cid_len..].to_vec(),
                })
            })
            .collect()
    }
}

fn encode_header(roots: &[CidLink]) -> Result<Vec<u8>> {
    let root_values: Result<Vec<CborValue>> = roots
        .iter()
        .map(|link| {
            let cid = Cid::from_string(link.as_str())
                .map_err(|e| Error::Repository(format!("bad root CID: {e}")))?;
            // DAG-CBOR links are tag 42 over identity-prefixed CID bytes.
            let mut bytes = vec![0x00];
            bytes.extend_from_slice(&cid.to_bytes());
            Ok(CborValue::Tag(42, Box::new(CborValue::Bytes(bytes))))
        })
        .collect();

    let header = CborValue::Map(vec![
        (
            CborValue::Text("roots".to_string()),
            CborValue::Array(root_values?),
        ),
        (
            CborValue::Text("version".to_string()),
            CborValue::Integer(1.into()),
        ),
    ]);

    let mut buf = Vec::new();
    ciborium::into_writer(&header, &mut buf).map_err(|e| Error::Encoding(e.to_string()))?;
    Ok(buf)
}

fn write_varint(out: &mut Vec<u8>, mut value: u64) {
    loop {
        let mut byte = (value & 0x7F) as u8;
        value >>= 7;
        if value != 0 {
            byte |= 0x80;
        }
        out.push(byte);
        if value == 0 {
            break;
        }
    }
}

/// Reads an unsigned LEB128 varint; `None` at a clean end of input.
fn read_varint(reader: &mut &[u8]) -> Result<Option<u64>> {
    let mut value: u64 = 0;
    let mut shift = 0;
    let mut read_any = false;

    loop {
        let Some((&byte, rest)) = reader.split_first() else {
            if read_any {
                return Err(Error::Repository("truncated varint".into()));
            }
            return Ok(None);
        };
        *reader = rest;
        read_any = true;

        value |= u64::from(byte & 0x7F) << shift;
        if byte & 0x80 == 0 {
            return Ok(Some(value));
        }
        shift += 7;
        if shift > 63 {
            return Err(Error::Repository("varint too large".into()));
        }
    }
}

fn skip_bytes(reader: &mut &[u8], n: usize) -> Result<()> {
    if reader.len() < n {
        return Err(Error::Repository("truncated CAR header".into()));
    }
    *reader = &reader[n..];
    Ok(())
}
