//! Resource limits and cooperative cancellation.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

pub use enough::{Stop, StopReason, Unstoppable};

use crate::error::CodecError;
use crate::surface::SurfaceFormat;

/// Resource limits for decode operations.
///
/// Checked when a codec asks for its output surface. All limits are optional.
#[derive(Clone, Debug, Default)]
pub struct Limits {
    /// Maximum image width in pixels.
    pub max_width: Option<u64>,
    /// Maximum image height in pixels.
    pub max_height: Option<u64>,
    /// Maximum total pixels (width × height).
    pub max_pixels: Option<u64>,
    /// Maximum surface allocation in bytes.
    pub max_memory_bytes: Option<u64>,
}

impl Limits {
    /// No restrictions.
    pub fn none() -> Self {
        Self::default()
    }

    /// Check a request for a `width` x `height` surface of `format`.
    ///
    /// Memory is counted with the padded stride, the way
    /// [`ImageSurfaceFactory`](crate::ImageSurfaceFactory) allocates.
    pub fn check(&self, format: SurfaceFormat, width: u32, height: u32) -> Result<(), CodecError> {
        let exceeded = |what: &str, value: u64, max: u64| {
            CodecError::LimitExceeded(format!("{what} {value} exceeds limit {max}"))
        };
        let (w, h) = (u64::from(width), u64::from(height));
        if let Some(max) = self.max_width.filter(|&max| w > max) {
            return Err(exceeded("width", w, max));
        }
        if let Some(max) = self.max_height.filter(|&max| h > max) {
            return Err(exceeded("height", h, max));
        }
        let pixels = w.saturating_mul(h);
        if let Some(max) = self.max_pixels.filter(|&max| pixels > max) {
            return Err(exceeded("pixel count", pixels, max));
        }
        if let Some(max) = self.max_memory_bytes {
            let stride = format.stride_for_width(width).ok_or(CodecError::NoMemory)?;
            let bytes = (stride as u64).saturating_mul(h);
            if bytes > max {
                return Err(exceeded("surface size", bytes, max));
            }
        }
        Ok(())
    }
}

/// Shareable cancellation flag, usable wherever an [`enough::Stop`] is.
///
/// Clones observe the same flag, so one clone can be handed to a decode while
/// another cancels it from a different thread.
#[derive(Clone, Debug, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }
}

impl Stop for CancelToken {
    fn check(&self) -> Result<(), StopReason> {
        if self.is_cancelled() {
            Err(StopReason::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Checked between source reads and between encoded rows.
pub(crate) fn check_stop(stop: &dyn Stop) -> Result<(), CodecError> {
    stop.check().map_err(|reason| {
        log::debug!("operation stopped: {reason:?}");
        CodecError::from(reason)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unlimited() {
        assert!(Limits::none().check(SurfaceFormat::Argb32, 1 << 20, 1 << 20).is_ok());
    }

    #[test]
    fn each_limit_reports_itself() {
        let limits = Limits {
            max_width: Some(1000),
            max_height: Some(800),
            max_pixels: Some(500_000),
            ..Default::default()
        };
        assert!(limits.check(SurfaceFormat::Rgb24, 500, 500).is_ok());

        let message = |w, h| match limits.check(SurfaceFormat::Rgb24, w, h) {
            Err(CodecError::LimitExceeded(msg)) => msg,
            other => panic!("expected limit error, got {other:?}"),
        };
        assert_eq!(message(2000, 10), "width 2000 exceeds limit 1000");
        assert_eq!(message(10, 900), "height 900 exceeds limit 800");
        assert_eq!(message(1000, 800), "pixel count 800000 exceeds limit 500000");
    }

    #[test]
    fn memory_counts_padded_stride() {
        let limits = Limits {
            max_memory_bytes: Some(64),
            ..Default::default()
        };
        // 3 A8 pixels pad to a 4-byte stride: 16 rows fit exactly.
        assert!(limits.check(SurfaceFormat::A8, 3, 16).is_ok());
        assert!(matches!(
            limits.check(SurfaceFormat::A8, 3, 17),
            Err(CodecError::LimitExceeded(_))
        ));
        assert!(limits.check(SurfaceFormat::Argb32, 5, 4).is_err());
    }

    #[test]
    fn cancel_token_shared_between_clones() {
        let token = CancelToken::new();
        let handle = token.clone();
        assert!(check_stop(&token).is_ok());
        handle.cancel();
        assert!(matches!(token.check(), Err(StopReason::Cancelled)));
        assert!(matches!(check_stop(&token), Err(CodecError::Cancelled)));
        assert!(Unstoppable.check().is_ok());
    }

    /// Any `enough` stop source works, not just [`CancelToken`].
    #[test]
    fn foreign_stop_sources() {
        struct AlwaysStopped;
        impl Stop for AlwaysStopped {
            fn check(&self) -> Result<(), StopReason> {
                Err(StopReason::Cancelled)
            }
        }
        assert!(matches!(check_stop(&AlwaysStopped), Err(CodecError::Cancelled)));
        assert!(check_stop(&Unstoppable).is_ok());
    }
}
