// core/src/slip.rs

//! Proof-of-payment uploads for manual methods.
//!
//! The declared content type must be on the allow-list and agree with the
//! file's magic bytes. Files are stored under a generated name; the client's
//! filename never reaches the filesystem.

use crate::error::{SettleError, SettleResult};
use chrono::Utc;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::{info, instrument, warn};

/// 6 MiB
pub const MAX_SLIP_BYTES: usize = 6 * 1024 * 1024;

/// (declared MIME type, stored extension)
const ALLOWED_TYPES: &[(&str, &str)] = &[("image/png", "png"), ("image/jpeg", "jpg"), ("image/webp", "webp")];

#[derive(Debug, Clone)]
pub struct SlipUpload {
  pub content_type: String,
  pub bytes: Vec<u8>,
  /// Logged only.
  pub original_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredSlip {
  pub file_name: String,
  pub url: String,
  pub size: usize,
  pub content_type: String,
}

#[derive(Debug, Clone)]
pub struct SlipCollector {
  dir: PathBuf,
  public_base: String,
  max_bytes: usize,
}

impl SlipCollector {
  pub fn new(dir: impl Into<PathBuf>, public_base: impl Into<String>) -> Self {
    SlipCollector {
      dir: dir.into(),
      public_base: public_base.into().trim_end_matches('/').to_string(),
      max_bytes: MAX_SLIP_BYTES,
    }
  }

  pub fn with_max_bytes(mut self, max_bytes: usize) -> Self {
    self.max_bytes = max_bytes;
    self
  }

  pub fn dir(&self) -> &Path {
    &self.dir
  }

  /// Checks type, size and magic bytes. Returns the extension to store under.
  pub fn validate(&self, upload: &SlipUpload) -> SettleResult<&'static str> {
    let declared = normalize_content_type(&upload.content_type);
    let ext = ALLOWED_TYPES
      .iter()
      .find(|(mime, _)| *mime == declared)
      .map(|(_, ext)| *ext)
      .ok_or_else(|| {
        SettleError::validation(format!(
          "unsupported slip type '{}'; allowed: {}",
          declared,
          ALLOWED_TYPES.iter().map(|(m, _)| *m).collect::<Vec<_>>().join(", ")
        ))
      })?;

    if upload.bytes.is_empty() {
      return Err(SettleError::validation("slip file is empty"));
    }
    if upload.bytes.len() > self.max_bytes {
      return Err(SettleError::validation(format!(
        "slip too large: {} bytes, maximum is {} bytes",
        upload.bytes.len(),
        self.max_bytes
      )));
    }
    if sniff_image_type(&upload.bytes) != Some(declared.as_str()) {
      return Err(SettleError::validation(format!(
        "slip content does not look like {declared}"
      )));
    }
    Ok(ext)
  }

  /// Validates and writes the file. Nothing is written when validation fails.
  #[instrument(skip(self, upload), fields(content_type = %upload.content_type, size = upload.bytes.len(), original_name = ?upload.original_name))]
  pub async fn store(&self, upload: &SlipUpload) -> SettleResult<StoredSlip> {
    let ext = self.validate(upload)?;

    tokio::fs::create_dir_all(&self.dir)
      .await
      .map_err(|e| storage_error(e, format!("creating slip dir {}", self.dir.display())))?;

    let file_name = storage_name(ext);
    let path = self.dir.join(&file_name);
    // create_new: a name collision fails instead of overwriting someone else's slip
    let mut file = tokio::fs::OpenOptions::new()
      .write(true)
      .create_new(true)
      .open(&path)
      .await
      .map_err(|e| storage_error(e, format!("creating {}", path.display())))?;
    file
      .write_all(&upload.bytes)
      .await
      .map_err(|e| storage_error(e, format!("writing {}", path.display())))?;
    file
      .flush()
      .await
      .map_err(|e| storage_error(e, format!("flushing {}", path.display())))?;

    info!(file_name = %file_name, "Payment slip stored.");
    Ok(StoredSlip {
      url: format!("{}/{}", self.public_base, file_name),
      file_name,
      size: upload.bytes.len(),
      content_type: normalize_content_type(&upload.content_type),
    })
  }

  /// Best-effort removal of a slip whose order update did not go through.
  pub async fn discard(&self, slip: &StoredSlip) {
    if let Err(e) = tokio::fs::remove_file(self.dir.join(&slip.file_name)).await {
      warn!(file_name = %slip.file_name, error = %e, "Could not remove orphaned slip.");
    }
  }
}

fn storage_error(e: std::io::Error, context: String) -> SettleError {
  SettleError::from(anyhow::Error::new(e).context(context))
}

fn normalize_content_type(raw: &str) -> String {
  let essence = raw.split(';').next().unwrap_or_default().trim().to_ascii_lowercase();
  if essence == "image/jpg" {
    return "image/jpeg".to_string();
  }
  essence
}

fn sniff_image_type(bytes: &[u8]) -> Option<&'static str> {
  if bytes.starts_with(&[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A]) {
    Some("image/png")
  } else if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
    Some("image/jpeg")
  } else if bytes.len() >= 12 && &bytes[0..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
    Some("image/webp")
  } else {
    None
  }
}

/// `<unix millis>-<16 hex chars>.<ext>`
pub fn storage_name(ext: &str) -> String {
  let mut suffix = [0u8; 8];
  rand::thread_rng().fill_bytes(&mut suffix);
  format!("{}-{}.{}", Utc::now().timestamp_millis(), hex::encode(suffix), ext)
}
