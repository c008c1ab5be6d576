// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Parser for gremlin method chains
//!
//! Produces a source name followed by a chain of calls, without knowing what
//! any step means. Arguments are literals or nested calls such as predicates
//! (`inside(2014, 2020)`, `P.gt(3)`).

use crate::local::gremlin::GremlinError;
use nom::{
    branch::alt,
    bytes::complete::tag,
    character::complete::{alpha1, alphanumeric1, char, digit1, multispace0, one_of},
    combinator::{all_consuming, map, map_res, not, opt, recognize, value},
    multi::{many0, separated_list0},
    sequence::{delimited, pair, preceded, terminated, tuple},
    IResult,
};

#[derive(Debug, Clone, PartialEq)]
pub enum Arg {
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Call(Call),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub name: String,
    pub args: Vec<Arg>,
}

/// `source.call().call()...`
#[derive(Debug, Clone, PartialEq)]
pub struct Chain {
    pub source: String,
    pub calls: Vec<Call>,
}

/// Parse a complete script; trailing input is an error
pub fn parse_chain(input: &str) -> Result<Chain, GremlinError> {
    match all_consuming(delimited(multispace0, chain, multispace0))(input) {
        Ok((_, parsed)) => Ok(parsed),
        Err(nom::Err::Error(e)) | Err(nom::Err::Failure(e)) => Err(GremlinError::Syntax {
            offset: input.len() - e.input.len(),
            message: format!("unexpected input near '{}'", snippet(e.input)),
        }),
        Err(nom::Err::Incomplete(_)) => Err(GremlinError::Syntax {
            offset: input.len(),
            message: "incomplete script".to_string(),
        }),
    }
}

fn snippet(input: &str) -> &str {
    match input.char_indices().nth(20) {
        Some((end, _)) => &input[..end],
        None => input,
    }
}

fn chain(input: &str) -> IResult<&str, Chain> {
    let (input, source) = identifier(input)?;
    let (input, calls) = many0(preceded(ws(char('.')), call))(input)?;
    Ok((
        input,
        Chain {
            source: source.to_string(),
            calls,
        },
    ))
}

fn ws<'a, O, F>(inner: F) -> impl FnMut(&'a str) -> IResult<&'a str, O>
where
    F: FnMut(&'a str) -> IResult<&'a str, O>,
{
    delimited(multispace0, inner, multispace0)
}

fn identifier(input: &str) -> IResult<&str, &str> {
    recognize(pair(
        alt((alpha1, tag("_"))),
        many0(alt((alphanumeric1, tag("_")))),
    ))(input)
}

fn call(input: &str) -> IResult<&str, Call> {
    map(
        tuple((
            identifier,
            ws(char('(')),
            separated_list0(ws(char(',')), ws(arg)),
            char(')'),
        )),
        |(name, _, args, _)| Call {
            name: name.to_string(),
            args,
        },
    )(input)
}

fn arg(input: &str) -> IResult<&str, Arg> {
    alt((
        map(string_literal, Arg::Str),
        number,
        boolean,
        map(preceded(opt(tag("P.")), call), Arg::Call),
    ))(input)
}

fn boolean(input: &str) -> IResult<&str, Arg> {
    alt((
        value(Arg::Bool(true), terminated(tag("true"), not(alphanumeric1))),
        value(Arg::Bool(false), terminated(tag("false"), not(alphanumeric1))),
    ))(input)
}

/// Integers (optionally suffixed `L`) and decimal floats
fn number(input: &str) -> IResult<&str, Arg> {
    alt((
        map_res(
            recognize(tuple((opt(char('-')), digit1, char('.'), digit1))),
            |s: &str| s.parse::<f64>().map(Arg::Float),
        ),
        map_res(
            terminated(recognize(pair(opt(char('-')), digit1)), opt(one_of("lL"))),
            |s: &str| s.parse::<i64>().map(Arg::Int),
        ),
    ))(input)
}

/// Single or double quoted string with backslash escapes
fn string_literal(input: &str) -> IResult<&str, String> {
    alt((quoted('\''), quoted('"')))(input)
}

fn quoted(quote: char) -> impl Fn(&str) -> IResult<&str, String> {
    move |input: &str| {
        let (rest, _) = char(quote)(input)?;
        let mut out = String::new();
        let mut chars = rest.char_indices();
        while let Some((i, c)) = chars.next() {
            if c == quote {
                return Ok((&rest[i + c.len_utf8()..], out));
            }
            if c == '\\' {
                match chars.next() {
                    Some((_, 'n')) => out.push('\n'),
                    Some((_, 't')) => out.push('\t'),
                    Some((_, escaped)) => out.push(escaped),
                    None => break,
                }
            } else {
                out.push(c);
            }
        }
        Err(nom::Err::Error(nom::error::Error::new(
            input,
            nom::error::ErrorKind::Char,
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_chain_with_predicate() {
        let chain = parse_chain("g.V().has('year', inside(2014, 2020)).outE('cites')").unwrap();
        assert_eq!(chain.source, "g");
        assert_eq!(chain.calls.len(), 3);
        assert_eq!(chain.calls[0].name, "V");
        assert!(chain.calls[0].args.is_empty());
        assert_eq!(
            chain.calls[1].args,
            vec![
                Arg::Str("year".into()),
                Arg::Call(Call {
                    name: "inside".into(),
                    args: vec![Arg::Int(2014), Arg::Int(2020)],
                }),
            ]
        );
        assert_eq!(chain.calls[2].args, vec![Arg::Str("cites".into())]);
    }

    #[test]
    fn test_parse_literals() {
        let chain =
            parse_chain(" g . V(1L, -2, 3.5) .has(\"name\", P.neq('o\\'k')).has('x', true) ")
                .unwrap();
        assert_eq!(
            chain.calls[0].args,
            vec![Arg::Int(1), Arg::Int(-2), Arg::Float(3.5)]
        );
        assert_eq!(
            chain.calls[1].args[1],
            Arg::Call(Call {
                name: "neq".into(),
                args: vec![Arg::Str("o'k".into())],
            })
        );
        assert_eq!(chain.calls[2].args[1], Arg::Bool(true));
    }

    #[test]
    fn test_syntax_errors_carry_offset() {
        match parse_chain("g.V().has('year'") {
            Err(GremlinError::Syntax { offset, .. }) => assert!(offset >= 5),
            other => panic!("expected syntax error, got {:?}", other),
        }
        assert!(parse_chain("g.V() extra").is_err());
        assert!(parse_chain("").is_err());
    }
}
