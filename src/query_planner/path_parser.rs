use nom::{
    branch::alt,
    bytes::complete::{tag, tag_no_case},
    character::complete::{alpha1, alphanumeric1, char, multispace0},
    combinator::{all_consuming, recognize},
    error::ParseError,
    multi::many0,
    sequence::{delimited, pair, preceded},
    IResult, Parser,
};

use super::errors::ResolveError;
use super::path_expr::PathExpression;

fn ws<'a, O, E: ParseError<&'a str>, F>(inner: F) -> impl Parser<&'a str, Output = O, Error = E>
where
    F: Parser<&'a str, Output = O, Error = E>,
{
    delimited(multispace0, inner, multispace0)
}

// a letter or underscore followed by letters, digits and underscores
fn identifier(input: &str) -> IResult<&str, &str> {
    recognize(pair(
        alt((alpha1, tag("_"))),
        many0(alt((alphanumeric1, tag("_")))),
    ))
    .parse(input)
}

fn parse_treat(input: &str) -> IResult<&str, PathExpression> {
    let (input, _) = ws(tag_no_case("TREAT")).parse(input)?;
    let (input, _) = ws(char('(')).parse(input)?;
    let (input, parent) = parse_path_expression(input)?;
    let (input, _) = ws(tag_no_case("AS")).parse(input)?;
    let (input, target) = ws(identifier).parse(input)?;
    let (input, _) = ws(char(')')).parse(input)?;
    Ok((input, parent.treat(target)))
}

fn parse_map_key(input: &str) -> IResult<&str, PathExpression> {
    let (input, _) = ws(tag_no_case("KEY")).parse(input)?;
    let (input, _) = ws(char('(')).parse(input)?;
    let (input, parent) = parse_path_expression(input)?;
    let (input, _) = ws(char(')')).parse(input)?;
    Ok((input, parent.key()))
}

fn parse_map_value(input: &str) -> IResult<&str, PathExpression> {
    let (input, _) = ws(tag_no_case("VALUE")).parse(input)?;
    let (input, _) = ws(char('(')).parse(input)?;
    let (input, parent) = parse_path_expression(input)?;
    let (input, _) = ws(char(')')).parse(input)?;
    Ok((input, parent.value()))
}

fn parse_root(input: &str) -> IResult<&str, PathExpression> {
    let (input, alias) = identifier(input)?;
    Ok((input, PathExpression::root(alias)))
}

pub fn parse_path_expression(input: &str) -> IResult<&str, PathExpression> {
    let (input, primary) =
        ws(alt((parse_treat, parse_map_key, parse_map_value, parse_root))).parse(input)?;
    let (input, attributes) = many0(preceded(ws(char('.')), ws(identifier))).parse(input)?;
    let path = attributes
        .into_iter()
        .fold(primary, |path, attribute| path.nav(attribute));
    Ok((input, path))
}

pub fn parse_path(input: &str) -> Result<PathExpression, ResolveError> {
    all_consuming(parse_path_expression)
        .parse(input)
        .map(|(_, path)| path)
        .map_err(|e| ResolveError::PathSyntax {
            input: input.to_string(),
            message: e.to_string(),
        })
}
