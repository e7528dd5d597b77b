use crate::error::{MediaFfmpegError, Result};

/// Rational value as reported by `ffprobe` for frame rates and time bases.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rational {
    pub num: i32,
    pub den: i32,
}

impl Rational {
    /// Creates a validated rational.
    ///
    /// # Example
    /// ```
    /// use media_ffmpeg::Rational;
    ///
    /// let rate = Rational::new(30_000, 1_001).expect("valid");
    /// assert_eq!(rate.den, 1_001);
    /// ```
    pub fn new(num: i32, den: i32) -> Result<Self> {
        if den <= 0 || num < 0 {
            return Err(MediaFfmpegError::InvalidRational { num, den });
        }

        Ok(Self { num, den })
    }

    /// Parses a `num/den` text into a rational.
    ///
    /// `ffprobe` reports unknown rates as `0/0`, which is rejected here so
    /// callers can treat it as absent.
    ///
    /// # Example
    /// ```
    /// use media_ffmpeg::Rational;
    ///
    /// let rate = Rational::parse("30/1").expect("valid");
    /// assert_eq!(rate.as_f64(), 30.0);
    /// ```
    pub fn parse(input: &str) -> Result<Self> {
        let (num, den) = input
            .split_once('/')
            .ok_or_else(|| MediaFfmpegError::Parse {
                context: "rational",
                value: input.to_string(),
            })?;
        let num = parse_i32(num, "rational num")?;
        let den = parse_i32(den, "rational den")?;
        Self::new(num, den)
    }

    /// Returns the value as floating point.
    pub fn as_f64(self) -> f64 {
        f64::from(self.num) / f64::from(self.den)
    }

    /// Returns true when the rational describes a usable positive rate.
    pub fn is_positive(self) -> bool {
        self.num > 0 && self.den > 0
    }
}

fn parse_i32(value: &str, context: &'static str) -> Result<i32> {
    value
        .trim()
        .parse::<i32>()
        .map_err(|_| MediaFfmpegError::Parse {
            context,
            value: value.to_string(),
        })
}
