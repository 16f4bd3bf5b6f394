use crate::{OssError, OssResult, PartSpec, StoreCapabilities, UploadConfig, UploadPlan};

/// Splits an object into the byte ranges of a multipart upload
#[derive(Debug, Clone)]
pub struct PartPlanner {
    min_part_size: u64,
    max_part_size: u64,
    max_parts: u32,
}

impl PartPlanner {
    pub fn new(min_part_size: u64, max_part_size: u64, max_parts: u32) -> Self {
        Self {
            min_part_size,
            max_part_size,
            max_parts,
        }
    }

    pub fn from_config(config: &UploadConfig) -> Self {
        Self::new(config.min_part_size, config.max_part_size, config.max_parts)
    }

    /// Tighten the limits to what the backend accepts
    pub fn with_capabilities(mut self, caps: &StoreCapabilities) -> Self {
        self.min_part_size = self.min_part_size.max(caps.min_part_size);
        self.max_part_size = self.max_part_size.min(caps.max_part_size);
        self.max_parts = self.max_parts.min(caps.max_parts);
        self
    }

    pub fn min_part_size(&self) -> u64 {
        self.min_part_size
    }

    /// Compute the parts for an object of `total_size` bytes.
    ///
    /// Every part is `part_size` long except the last, which holds the
    /// remainder. Zero-length objects cannot be uploaded as multipart and
    /// must take the single-put path.
    pub fn plan(&self, total_size: u64, part_size: u64) -> OssResult<UploadPlan> {
        if total_size == 0 {
            return Err(OssError::invalid_size(
                "zero-length objects must be uploaded with a single put",
            ));
        }
        if part_size < self.min_part_size {
            return Err(OssError::invalid_part_size(
                part_size,
                format!("below the minimum of {} bytes", self.min_part_size),
            ));
        }
        if part_size > self.max_part_size {
            return Err(OssError::invalid_part_size(
                part_size,
                format!("above the maximum of {} bytes", self.max_part_size),
            ));
        }

        let count = total_size.div_ceil(part_size);
        if count > u64::from(self.max_parts) {
            return Err(OssError::invalid_part_size(
                part_size,
                format!(
                    "{} bytes would need {} parts, more than the limit of {}",
                    total_size, count, self.max_parts
                ),
            ));
        }

        let parts = (0..count)
            .map(|idx| {
                let offset = idx * part_size;
                let length = part_size.min(total_size - offset);
                PartSpec::new(idx as u32 + 1, offset, length)
            })
            .collect();

        Ok(UploadPlan {
            total_size,
            part_size,
            parts,
        })
    }

    /// Smallest part size at or above `preferred` that fits within `max_parts`
    pub fn fit_part_size(&self, total_size: u64, preferred: u64) -> u64 {
        let needed = total_size.div_ceil(u64::from(self.max_parts.max(1)));
        preferred.max(needed).max(self.min_part_size)
    }
}

impl Default for PartPlanner {
    fn default() -> Self {
        Self::from_config(&UploadConfig::default())
    }
}
