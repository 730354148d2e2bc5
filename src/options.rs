// Copyright 2025 Brian Langenberger
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

use crate::metadata::BlockSize;

/// Options for operations which write FLAC files
///
/// # Example
///
/// ```
/// use flac_meta::Options;
/// use flac_meta::metadata::BlockSize;
///
/// let options = Options::default()
///     .padding(BlockSize::from(1024u16))
///     .no_seektable()
///     .vendor("my tagger 1.0");
///
/// assert_eq!(options.vendor_string(), "my tagger 1.0");
/// ```
#[derive(Clone, Debug)]
pub struct Options {
    pub(crate) max_padding: u64,
    pub(crate) padding: BlockSize,
    pub(crate) seekpoint_interval: Option<u32>,
    pub(crate) vendor_string: String,
}

impl Options {
    /// Largest total padding, in bytes, an in-place update may leave behind
    ///
    /// Updates which would leave more padding than this
    /// rewrite the whole file instead.
    pub fn max_padding(self, max_padding: u64) -> Self {
        Self {
            max_padding,
            ..self
        }
    }

    /// Size of PADDING block added to newly written files
    pub fn padding(self, padding: BlockSize) -> Self {
        Self { padding, ..self }
    }

    /// Distance between seek points, in seconds
    ///
    /// An interval of 0 is treated as 1 second.
    pub fn seekpoint_interval(self, seconds: u32) -> Self {
        Self {
            seekpoint_interval: Some(seconds.max(1)),
            ..self
        }
    }

    /// Don't add SEEKTABLE blocks to newly written files
    pub fn no_seektable(self) -> Self {
        Self {
            seekpoint_interval: None,
            ..self
        }
    }

    /// Vendor string for newly created VORBIS_COMMENT blocks
    pub fn vendor<S: Into<String>>(self, vendor_string: S) -> Self {
        Self {
            vendor_string: vendor_string.into(),
            ..self
        }
    }

    /// Returns vendor string for newly created VORBIS_COMMENT blocks
    pub fn vendor_string(&self) -> &str {
        &self.vendor_string
    }

    /// Distance between seek points in samples, if seek tables are wanted
    pub(crate) fn seekpoint_samples(&self, sample_rate: u32) -> Option<u64> {
        self.seekpoint_interval
            .map(|seconds| (u64::from(seconds) * u64::from(sample_rate)).max(1))
    }
}

impl Default for Options {
    fn default() -> Self {
        Self {
            max_padding: 1 << 20,
            padding: BlockSize::from(4096u16),
            seekpoint_interval: Some(10),
            vendor_string: concat!(env!("CARGO_PKG_NAME"), " ", env!("CARGO_PKG_VERSION"))
                .to_owned(),
        }
    }
}
