//! Jupyter wire protocol codec
//!
//! A message travels as a multipart ZeroMQ message:
//! ```text
//! [identities...] <IDS|MSG> signature header parent_header metadata content [buffers...]
//! ```
//! The signature is the hex HMAC-SHA256 of the four JSON frames, keyed with
//! the connection key. An empty key disables signing.

use bytes::Bytes;
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::common::{Error, Result};

use super::types::{Header, KernelMessage};

/// Frame separating routing identities from the message proper
pub const DELIMITER: &[u8] = b"<IDS|MSG>";

type HmacSha256 = Hmac<Sha256>;

/// Message signer/verifier for one connection
#[derive(Clone)]
pub struct Signer {
    mac: Option<HmacSha256>,
}

impl Signer {
    pub fn new(key: &str) -> Result<Self> {
        if key.is_empty() {
            return Ok(Self { mac: None });
        }
        let mac = HmacSha256::new_from_slice(key.as_bytes())
            .map_err(|e| Error::Internal(format!("Invalid HMAC key: {}", e)))?;
        Ok(Self { mac: Some(mac) })
    }

    /// Hex signature of the given frames; empty when signing is disabled
    pub fn sign(&self, frames: &[&[u8]]) -> String {
        let Some(mac) = &self.mac else {
            return String::new();
        };
        let mut mac = mac.clone();
        for frame in frames {
            mac.update(frame);
        }
        mac.finalize()
            .into_bytes()
            .iter()
            .map(|b| format!("{:02x}", b))
            .collect()
    }

    /// Check a received signature in constant time
    pub fn verify(&self, signature: &[u8], frames: &[&[u8]]) -> bool {
        let Some(mac) = &self.mac else {
            return true;
        };
        let Some(expected) = decode_hex(signature) else {
            return false;
        };
        let mut mac = mac.clone();
        for frame in frames {
            mac.update(frame);
        }
        mac.verify_slice(&expected).is_ok()
    }
}

fn decode_hex(hex: &[u8]) -> Option<Vec<u8>> {
    if hex.len() % 2 != 0 {
        return None;
    }
    hex.chunks(2)
        .map(|pair| {
            let s = std::str::from_utf8(pair).ok()?;
            u8::from_str_radix(s, 16).ok()
        })
        .collect()
}

/// Serialize a message into its multipart frames
pub fn encode(msg: &KernelMessage, signer: &Signer) -> Result<Vec<Bytes>> {
    let header = serde_json::to_vec(&msg.header)?;
    let parent = serde_json::to_vec(&msg.parent_header)?;
    let metadata = serde_json::to_vec(&msg.metadata)?;
    let content = serde_json::to_vec(&msg.content)?;

    let signature = signer.sign(&[
        header.as_slice(),
        parent.as_slice(),
        metadata.as_slice(),
        content.as_slice(),
    ]);

    let mut frames = Vec::with_capacity(msg.identities.len() + 6 + msg.buffers.len());
    frames.extend(msg.identities.iter().cloned());
    frames.push(Bytes::from_static(DELIMITER));
    frames.push(Bytes::from(signature));
    frames.push(Bytes::from(header));
    frames.push(Bytes::from(parent));
    frames.push(Bytes::from(metadata));
    frames.push(Bytes::from(content));
    frames.extend(msg.buffers.iter().cloned());
    Ok(frames)
}

/// Parse multipart frames into a message, verifying the signature
pub fn decode(frames: Vec<Bytes>, signer: &Signer) -> Result<KernelMessage> {
    let split = frames
        .iter()
        .position(|f| &f[..] == DELIMITER)
        .ok_or_else(|| Error::KernelProtocol("Missing <IDS|MSG> delimiter".to_string()))?;

    if frames.len() < split + 6 {
        return Err(Error::KernelProtocol(format!(
            "Truncated message: {} frames after delimiter",
            frames.len() - split - 1
        )));
    }

    let mut frames = frames;
    let buffers = frames.split_off(split + 6);
    let body = frames.split_off(split);
    let identities = frames;

    // body: delimiter, signature, header, parent, metadata, content
    let (signature, header, parent, metadata, content): (&[u8], &[u8], &[u8], &[u8], &[u8]) =
        (&body[1], &body[2], &body[3], &body[4], &body[5]);

    if !signer.verify(signature, &[header, parent, metadata, content]) {
        return Err(Error::KernelProtocol("Invalid message signature".to_string()));
    }

    let header: Header = serde_json::from_slice(header)
        .map_err(|e| Error::KernelProtocol(format!("Invalid header: {}", e)))?;

    Ok(KernelMessage {
        identities,
        header,
        parent_header: serde_json::from_slice(parent)?,
        metadata: serde_json::from_slice(metadata)?,
        content: serde_json::from_slice(content)?,
        buffers,
    })
}
