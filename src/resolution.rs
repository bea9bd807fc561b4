//! Types for representing image resolutions.

use std::fmt;

/// Resolution (`width x height`) of an image or camera stream.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Resolution {
    width: u32,
    height: u32,
}

impl Resolution {
    /// 1080p resolution: `1920x1080`
    pub const RES_1080P: Self = Self {
        width: 1920,
        height: 1080,
    };

    /// 720p resolution: `1280x720`
    pub const RES_720P: Self = Self {
        width: 1280,
        height: 720,
    };

    /// VGA resolution: `640x480`
    pub const RES_VGA: Self = Self {
        width: 640,
        height: 480,
    };

    /// Creates a new [`Resolution`] of `width x height`.
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Returns the width of this [`Resolution`].
    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Returns the height of this [`Resolution`].
    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    #[inline]
    pub fn num_pixels(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }

    /// Returns `true` if either dimension is zero.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.num_pixels() == 0
    }

    /// Returns the resolution with width and height exchanged.
    #[inline]
    pub fn transposed(&self) -> Self {
        Self::new(self.height, self.width)
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

impl fmt::Debug for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display() {
        assert_eq!(Resolution::RES_1080P.to_string(), "1920x1080");
        assert_eq!(format!("{:?}", Resolution::RES_VGA), "640x480");
    }

    #[test]
    fn empty_and_transposed() {
        assert!(Resolution::new(0, 480).is_empty());
        assert!(!Resolution::RES_720P.is_empty());
        assert_eq!(Resolution::RES_720P.transposed(), Resolution::new(720, 1280));
        assert_eq!(Resolution::RES_VGA.num_pixels(), 640 * 480);
    }
}
