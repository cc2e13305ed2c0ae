//! Binary container formats.
//!
//! A [`Format`] selects a [`FormatStrategy`], which owns the Parquet writer
//! configuration of the container and the extension of its blob key.

use parquet::{
    basic::{Compression, ZstdLevel},
    file::properties::{EnabledStatistics, WriterProperties, WriterVersion},
};
use serde::{Deserialize, Serialize};

use crate::{params, rw::Error, traits};

pub trait FormatStrategy: Send + Sync {
    /// Blob key extension, without the leading dot
    fn extension(&self) -> &'static str;

    fn properties(&self) -> Result<WriterProperties, Error>;

    /// Name recorded in the `kind_meta` of stored containers
    fn label(&self) -> &'static str;
}

/// Snappy pages, cheap to write and to read back
pub struct DefaultStrategy;

impl FormatStrategy for DefaultStrategy {
    fn extension(&self) -> &'static str {
        params::ext::PARQUET
    }

    fn properties(&self) -> Result<WriterProperties, Error> {
        Ok(WriterProperties::builder()
            .set_writer_version(WriterVersion::PARQUET_2_0)
            .set_compression(Compression::SNAPPY)
            .build())
    }

    fn label(&self) -> &'static str {
        "default"
    }
}

/// ZSTD pages with page level statistics, for large tables stored once
pub struct CompressedStrategy;

impl CompressedStrategy {
    const ZSTD_LEVEL: i32 = 9;
}

impl FormatStrategy for CompressedStrategy {
    fn extension(&self) -> &'static str {
        params::ext::PARQUET
    }

    fn properties(&self) -> Result<WriterProperties, Error> {
        Ok(WriterProperties::builder()
            .set_writer_version(WriterVersion::PARQUET_2_0)
            .set_compression(Compression::ZSTD(ZstdLevel::try_new(Self::ZSTD_LEVEL)?))
            .set_statistics_enabled(EnabledStatistics::Page)
            .build())
    }

    fn label(&self) -> &'static str {
        "compressed"
    }
}

/// Plain pages, no compression
pub struct UncompressedStrategy;

impl FormatStrategy for UncompressedStrategy {
    fn extension(&self) -> &'static str {
        params::ext::PARQUET
    }

    fn properties(&self) -> Result<WriterProperties, Error> {
        Ok(WriterProperties::builder()
            .set_writer_version(WriterVersion::PARQUET_1_0)
            .set_compression(Compression::UNCOMPRESSED)
            .set_dictionary_enabled(false)
            .build())
    }

    fn label(&self) -> &'static str {
        "uncompressed"
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Copy, Clone, Default)]
#[serde(rename_all = "snake_case")]
pub enum Format {
    #[default]
    Default,
    Compressed,
    Uncompressed,
}

impl Format {
    pub fn strategy(&self) -> &'static dyn FormatStrategy {
        match self {
            Self::Default => &DefaultStrategy,
            Self::Compressed => &CompressedStrategy,
            Self::Uncompressed => &UncompressedStrategy,
        }
    }
}

impl traits::AsExtension for Format {
    fn as_extension(&self) -> String {
        self.strategy().extension().to_owned()
    }
}

impl std::fmt::Display for Format {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.strategy().label())
    }
}

impl std::str::FromStr for Format {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        [Self::Default, Self::Compressed, Self::Uncompressed]
            .into_iter()
            .find(|f| f.strategy().label() == value)
            .ok_or_else(|| Error::UnknownFormat(value.to_owned()))
    }
}
