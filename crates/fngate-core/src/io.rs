//! Persistence for gateway snapshots and CLI state.
//!
//! Files are JSON or CBOR, chosen by extension. Reads refuse anything else;
//! writes fall back to JSON. [`Versioned`] tags a payload with its wire
//! version so stale files are rejected at load time instead of
//! half-deserializing.

use crate::gateway::GatewaySnapshot;
use anyhow::{anyhow, bail, Context, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

/// On-disk encoding.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Format {
    /// Pretty-printed JSON; digests render as hex.
    Json,
    /// CBOR; digests are raw byte strings.
    Cbor,
}

impl Format {
    /// Format named by the extension of `path` (case-insensitive).
    pub fn detect(path: &Path) -> Result<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);
        match ext.as_deref() {
            Some("json") => Ok(Self::Json),
            Some("cbor") => Ok(Self::Cbor),
            Some(other) => bail!("unsupported extension .{other} for {}", path.display()),
            None => bail!("{} has no extension (expected .json or .cbor)", path.display()),
        }
    }

    /// Like [`Format::detect`], but anything unrecognized is JSON.
    #[must_use]
    pub fn for_write(path: &Path) -> Self {
        Self::detect(path).unwrap_or(Self::Json)
    }

    /// Decode one value from `path`.
    pub fn read<T: DeserializeOwned>(self, path: &Path) -> Result<T> {
        let file = File::open(path).with_context(|| format!("open {}", path.display()))?;
        let rdr = BufReader::new(file);
        match self {
            Self::Json => serde_json::from_reader(rdr).map_err(anyhow::Error::from),
            Self::Cbor => ciborium::de::from_reader(rdr).map_err(|e| anyhow!("{e}")),
        }
        .with_context(|| format!("decode {self:?} {}", path.display()))
    }

    /// Encode `value` to `path`, creating parent directories.
    pub fn write<T: Serialize + ?Sized>(self, path: &Path, value: &T) -> Result<()> {
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir).with_context(|| format!("create {}", dir.display()))?;
        }
        let file = File::create(path).with_context(|| format!("create {}", path.display()))?;
        let mut w = BufWriter::new(file);
        match self {
            Self::Json => serde_json::to_writer_pretty(&mut w, value).map_err(anyhow::Error::from),
            Self::Cbor => ciborium::ser::into_writer(value, &mut w).map_err(|e| anyhow!("{e}")),
        }
        .with_context(|| format!("encode {self:?} {}", path.display()))?;
        w.flush().with_context(|| format!("flush {}", path.display()))
    }
}

/// Read `T` from a `.json` or `.cbor` file.
pub fn read_auto<T: DeserializeOwned, P: AsRef<Path>>(path: P) -> Result<T> {
    let path = path.as_ref();
    Format::detect(path)?.read(path)
}

/// Write `T` as CBOR for `.cbor` paths, JSON otherwise.
pub fn write_auto<T: Serialize + ?Sized, P: AsRef<Path>>(path: P, value: &T) -> Result<()> {
    let path = path.as_ref();
    Format::for_write(path).write(path, value)
}

/// Load a [`GatewaySnapshot`] file.
pub fn read_snapshot<P: AsRef<Path>>(path: P) -> Result<GatewaySnapshot> {
    read_auto(path)
}

/// Store a [`GatewaySnapshot`] file.
pub fn write_snapshot<P: AsRef<Path>>(path: P, snapshot: &GatewaySnapshot) -> Result<()> {
    write_auto(path, snapshot)
}

/// Encode `value` as CBOR bytes.
pub fn to_cbor<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    ciborium::ser::into_writer(value, &mut buf).map_err(|e| anyhow!("encode CBOR: {e}"))?;
    Ok(buf)
}

/// Decode a `T` from CBOR bytes.
pub fn from_cbor<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    ciborium::de::from_reader(bytes).map_err(|e| anyhow!("decode CBOR: {e}"))
}

/// A payload tagged with its wire version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Versioned<T> {
    /// Wire version tag.
    pub ver: u16,
    /// Wrapped payload.
    pub payload: T,
}

impl<T> Versioned<T> {
    /// Tag `payload` with `ver`.
    #[inline]
    pub const fn new(ver: u16, payload: T) -> Self {
        Self { ver, payload }
    }

    /// The payload, if it was written as version `expected`.
    pub fn expect_version(self, expected: u16) -> Result<T> {
        if self.ver != expected {
            bail!("wire version {} is not supported (expected {expected})", self.ver);
        }
        Ok(self.payload)
    }
}
