//! Parsers for the two text protocols AimTone reads: the frames a serial
//! rangefinder streams back, and the one-detection-per-line format an
//! external vision process can pipe in.

use crate::position_classifier::TargetPosition;
use crate::range_sensor::Millimeters;

use nom::{
    branch::alt,
    bytes::complete::{tag_no_case, take_till},
    character::complete::{char, i32, space0, space1, u32},
    combinator::{all_consuming, map, opt, value},
    multi::count,
    sequence::{delimited, preceded, separated_pair, terminated, tuple},
    Finish, IResult,
};
use std::fmt;

/// The rangefinder reports the distance on the third line of each read.
const RANGE_LINE_INDEX: usize = 2;

/// A message that could not be decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodeError {
    /// The unparsed remainder of the input where decoding gave up
    pub input: String,
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "could not decode {:?}", self.input)
    }
}

impl std::error::Error for DecodeError {}

fn skip_line(s: &[u8]) -> IResult<&[u8], &[u8]> {
    terminated(take_till(|c: u8| c == b'\n'), char('\n'))(s)
}

fn range_line(s: &[u8]) -> IResult<&[u8], Millimeters> {
    delimited(space0, u32, tuple((space0, opt(char('\r')), char('\n'))))(s)
}

fn parse_range_frame(s: &[u8]) -> IResult<&[u8], Millimeters> {
    preceded(count(skip_line, RANGE_LINE_INDEX), range_line)(s)
}

/// Pulls the distance, in millimetres, out of one raw rangefinder read.
///
/// The reading must be a complete line. A value cut off by the end of the
/// read is rejected rather than returned truncated.
pub fn decode_range_frame(bytes: &[u8]) -> Result<Millimeters, DecodeError> {
    match parse_range_frame(bytes).finish() {
        Ok((_remaining, range)) => Ok(range),
        Err(nom::error::Error { input, .. }) => Err(DecodeError {
            input: String::from_utf8_lossy(input).into_owned(),
        }),
    }
}

fn parse_no_detection(s: &str) -> IResult<&str, Option<TargetPosition>> {
    value(None, alt((tag_no_case("none"), tag_no_case("-"))))(s)
}

fn parse_position(s: &str) -> IResult<&str, Option<TargetPosition>> {
    map(
        separated_pair(
            i32,
            alt((delimited(space0, char(','), space0), map(space1, |_| ','))),
            i32,
        ),
        |(x, y)| Some(TargetPosition::new(x, y)),
    )(s)
}

/// Decodes one detection line: `x y`, `x,y`, or `none` / `-` / blank for a
/// frame with no target in it.
pub fn decode_detection_line(line: &str) -> Result<Option<TargetPosition>, DecodeError> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    match all_consuming(alt((parse_position, parse_no_detection)))(line).finish() {
        Ok((_remaining, detection)) => Ok(detection),
        Err(nom::error::Error { input, .. }) => Err(DecodeError {
            input: input.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn third_line_is_the_range() {
        assert_eq!(decode_range_frame(b"\x00\x11\nLIDAR\n1843\n12"), Ok(1843));
        assert_eq!(decode_range_frame(b"a\nb\r\n 907 \r\n"), Ok(907));
    }

    #[test]
    fn truncated_range_is_rejected() {
        assert!(decode_range_frame(b"a\nb\n18").is_err());
    }

    #[test]
    fn short_frames_are_rejected() {
        assert!(decode_range_frame(b"").is_err());
        assert!(decode_range_frame(b"only one line\n").is_err());
    }

    #[test]
    fn non_numeric_range_is_rejected() {
        let err = decode_range_frame(b"a\nb\nfar\n").unwrap_err();
        assert_eq!(err.input, "far\n");
    }

    #[test]
    fn detection_lines() {
        assert_eq!(
            decode_detection_line("150 70"),
            Ok(Some(TargetPosition::new(150, 70)))
        );
        assert_eq!(
            decode_detection_line("  320,240\n"),
            Ok(Some(TargetPosition::new(320, 240)))
        );
        assert_eq!(
            decode_detection_line("12 , -4"),
            Ok(Some(TargetPosition::new(12, -4)))
        );
        assert_eq!(
            decode_detection_line("-4 5"),
            Ok(Some(TargetPosition::new(-4, 5)))
        );
        assert_eq!(
            decode_detection_line("0 0"),
            Ok(Some(TargetPosition::new(0, 0)))
        );
    }

    #[test]
    fn empty_detection_lines() {
        assert_eq!(decode_detection_line("none"), Ok(None));
        assert_eq!(decode_detection_line("NONE"), Ok(None));
        assert_eq!(decode_detection_line("-"), Ok(None));
        assert_eq!(decode_detection_line("   "), Ok(None));
    }

    #[test]
    fn malformed_detection_lines() {
        assert!(decode_detection_line("150").is_err());
        assert!(decode_detection_line("150 70 3").is_err());
        assert!(decode_detection_line("x y").is_err());
    }
}
