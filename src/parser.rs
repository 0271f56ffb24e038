//! Vector literals for the command line: `[0.1, -2, 3e-1]`, `0.1,-2,0.3`
//! or whitespace separated `0.1 -2 0.3`.

use nom::{
    branch::alt,
    character::complete::{char, digit1, multispace0, multispace1, one_of},
    combinator::{opt, recognize},
    multi::separated_list1,
    sequence::{delimited, pair, tuple},
    IResult,
};

use crate::error::{FeatherError, Result};

// --- BASIC PARSERS ---

fn parse_float(input: &str) -> IResult<&str, f32> {
    let (input, num_str) = recognize(tuple((
        opt(one_of("+-")),
        alt((
            recognize(pair(digit1, opt(pair(char('.'), opt(digit1))))),
            recognize(pair(char('.'), digit1)),
        )),
        opt(tuple((one_of("eE"), opt(one_of("+-")), digit1))),
    )))(input)?;
    match num_str.parse::<f32>() {
        Ok(n) => Ok((input, n)),
        Err(_) => Err(nom::Err::Error(nom::error::Error::new(input, nom::error::ErrorKind::Float))),
    }
}

// --- HELPERS ---
fn ws<'a, F, O, E: nom::error::ParseError<&'a str>>(inner: F) -> impl FnMut(&'a str) -> IResult<&'a str, O, E>
where F: FnMut(&'a str) -> IResult<&'a str, O, E> {
    delimited(multispace0, inner, multispace0)
}

fn parse_components(input: &str) -> IResult<&str, Vec<f32>> {
    separated_list1(
        alt((recognize(ws(char(','))), multispace1)),
        parse_float,
    )(input)
}

fn parse_vector(input: &str) -> IResult<&str, Vec<f32>> {
    alt((
        delimited(ws(char('[')), parse_components, ws(char(']'))),
        parse_components,
    ))(input)
}

pub fn parse_vector_literal(input: &str) -> Result<Vec<f32>> {
    let input = input.trim();
    match parse_vector(input) {
        Ok((remainder, vector)) => {
            if !remainder.trim().is_empty() {
                return Err(FeatherError::Parse(format!("Unexpected tokens at end: '{}'", remainder)));
            }
            Ok(vector)
        }
        Err(nom::Err::Error(e)) | Err(nom::Err::Failure(e)) => {
            let context = if e.input.chars().count() > 20 {
                format!("{}...", e.input.chars().take(20).collect::<String>())
            } else {
                e.input.to_string()
            };
            Err(FeatherError::Parse(format!("Invalid vector near: '{}'", context)))
        }
        Err(nom::Err::Incomplete(_)) => Err(FeatherError::Parse("Incomplete vector.".to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bracketed_list() {
        assert_eq!(parse_vector_literal("[0.1, -2, 3e-1]").unwrap(), vec![0.1, -2.0, 0.3]);
        assert_eq!(parse_vector_literal("  [ 1 ,2,3 ]  ").unwrap(), vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_bare_lists() {
        assert_eq!(parse_vector_literal("0.5,.25,+1.").unwrap(), vec![0.5, 0.25, 1.0]);
        assert_eq!(parse_vector_literal("1 2\n3").unwrap(), vec![1.0, 2.0, 3.0]);
        assert_eq!(parse_vector_literal("-1E2").unwrap(), vec![-100.0]);
    }

    #[test]
    fn test_rejects_garbage() {
        assert!(matches!(parse_vector_literal(""), Err(FeatherError::Parse(_))));
        assert!(matches!(parse_vector_literal("[1, 2"), Err(FeatherError::Parse(_))));
        assert!(matches!(parse_vector_literal("[1, x]"), Err(FeatherError::Parse(_))));
        assert!(matches!(parse_vector_literal("1, 2, ..."), Err(FeatherError::Parse(_))));
    }
}
