use cssparser::{
    BasicParseErrorKind, ParseError, ParseErrorKind, Parser, ParserInput, ToCss, Token,
};
use smallvec::SmallVec;

use super::{
    AttrOperator, AttributeSelector, CompoundSelector, NthExpr, PseudoClass, SelectorList,
    TypeSelector,
};
use crate::error::SelectorError;

type ParseResult<'i, T> = Result<T, ParseError<'i, String>>;

/// Parse a comma-separated list of compound selectors.
///
/// ```
/// use rowsift_table::parse_selector;
///
/// let sel = parse_selector("td:nth-child(2), td.price").unwrap();
/// assert_eq!(sel.alternatives().len(), 2);
/// assert!(parse_selector("tr > td").is_err());
/// ```
pub fn parse_selector(text: &str) -> Result<SelectorList, SelectorError> {
    let mut input = ParserInput::new(text);
    let mut parser = Parser::new(&mut input);
    parse_list(&mut parser)
        .map(SelectorList::new)
        .map_err(|err| SelectorError::new(text.trim(), describe(err)))
}

fn parse_list<'i>(parser: &mut Parser<'i, '_>) -> ParseResult<'i, SmallVec<[CompoundSelector; 1]>> {
    let mut alternatives = SmallVec::new();
    loop {
        parser.skip_whitespace();
        let compound = parse_compound(parser)?;
        if compound.is_empty() {
            return Err(match parser.next_including_whitespace().ok().cloned() {
                Some(token) => parser.new_unexpected_token_error(token),
                None => parser.new_custom_error("expected a selector".to_string()),
            });
        }
        alternatives.push(compound);

        let state = parser.state();
        let had_space = matches!(
            parser.next_including_whitespace(),
            Ok(Token::WhiteSpace(_))
        );
        if !had_space {
            parser.reset(&state);
        }
        match parser.next().ok().cloned() {
            None => return Ok(alternatives),
            Some(Token::Comma) => continue,
            Some(Token::Delim(c @ ('>' | '+' | '~'))) => {
                return Err(parser.new_custom_error(format!("combinator `{c}` is not supported")));
            }
            Some(
                Token::Ident(_)
                | Token::IDHash(_)
                | Token::Delim('.' | '*')
                | Token::Colon
                | Token::SquareBracketBlock,
            ) if had_space => {
                return Err(
                    parser.new_custom_error("descendant combinators are not supported".to_string())
                );
            }
            Some(token) => return Err(parser.new_unexpected_token_error(token)),
        }
    }
}

/// Consume simple selectors until whitespace, a comma or the end of input.
fn parse_compound<'i>(parser: &mut Parser<'i, '_>) -> ParseResult<'i, CompoundSelector> {
    let mut compound = CompoundSelector::default();
    loop {
        let state = parser.state();
        let Ok(token) = parser.next_including_whitespace().cloned() else {
            break;
        };
        match &token {
            Token::Ident(name) if compound.is_empty() => {
                compound.type_selector = Some(TypeSelector::Tag(name.to_ascii_lowercase()));
            }
            Token::Delim('*') if compound.is_empty() => {
                compound.type_selector = Some(TypeSelector::Universal);
            }
            Token::Ident(_) | Token::Delim('*') => {
                return Err(parser.new_custom_error("type selector must come first".to_string()));
            }
            Token::IDHash(id) => {
                if compound.id.is_some() {
                    return Err(parser.new_custom_error("more than one id selector".to_string()));
                }
                compound.id = Some(id.to_string());
            }
            Token::Delim('.') => match parser.next_including_whitespace().ok().cloned() {
                Some(Token::Ident(class)) => compound.classes.push(class.to_string()),
                _ => {
                    return Err(
                        parser.new_custom_error("expected a class name after `.`".to_string())
                    );
                }
            },
            Token::SquareBracketBlock => {
                let attribute = parser.parse_nested_block(|p| parse_attribute(p))?;
                compound.attributes.push(attribute);
            }
            Token::Colon => {
                let pseudo = parse_pseudo_class(parser)?;
                compound.pseudo_classes.push(pseudo);
            }
            _ => {
                parser.reset(&state);
                break;
            }
        }
    }
    Ok(compound)
}

fn parse_attribute<'i>(parser: &mut Parser<'i, '_>) -> ParseResult<'i, AttributeSelector> {
    let name = parser.expect_ident()?.to_ascii_lowercase();
    let op = match parser.next().ok().cloned() {
        None => return Ok(AttributeSelector { name, matcher: None }),
        Some(Token::Delim('=')) => AttrOperator::Equals,
        Some(Token::IncludeMatch) => AttrOperator::Includes,
        Some(Token::PrefixMatch) => AttrOperator::Prefix,
        Some(Token::SuffixMatch) => AttrOperator::Suffix,
        Some(Token::SubstringMatch) => AttrOperator::Substring,
        Some(Token::DashMatch) => AttrOperator::DashMatch,
        Some(token) => return Err(parser.new_unexpected_token_error(token)),
    };
    let value = parser.expect_ident_or_string()?.to_string();
    parser.expect_exhausted()?;
    Ok(AttributeSelector {
        name,
        matcher: Some((op, value)),
    })
}

fn parse_pseudo_class<'i>(parser: &mut Parser<'i, '_>) -> ParseResult<'i, PseudoClass> {
    let token = parser.next_including_whitespace()?.clone();
    match &token {
        Token::Ident(name) if name.eq_ignore_ascii_case("first-child") => Ok(PseudoClass::FirstChild),
        Token::Ident(name) if name.eq_ignore_ascii_case("last-child") => Ok(PseudoClass::LastChild),
        Token::Function(name) if name.eq_ignore_ascii_case("nth-child") => {
            let (a, b) = parser.parse_nested_block(|p| {
                let nth = cssparser::parse_nth(p)?;
                p.expect_exhausted()?;
                Ok::<_, ParseError<'_, String>>(nth)
            })?;
            Ok(PseudoClass::NthChild(NthExpr::new(a, b)))
        }
        Token::Function(name) if name.eq_ignore_ascii_case("not") => {
            let inner = parser.parse_nested_block(|p| {
                p.skip_whitespace();
                let inner = parse_compound(p)?;
                if inner.is_empty() {
                    return Err(p.new_custom_error("empty :not()".to_string()));
                }
                p.expect_exhausted()?;
                Ok::<_, ParseError<'_, String>>(inner)
            })?;
            Ok(PseudoClass::Not(Box::new(inner)))
        }
        Token::Ident(name) | Token::Function(name) => {
            Err(parser.new_custom_error(format!("unsupported pseudo-class `:{name}`")))
        }
        _ => Err(parser.new_unexpected_token_error(token.clone())),
    }
}

fn describe(err: ParseError<'_, String>) -> String {
    let column = err.location.column;
    let message = match err.kind {
        ParseErrorKind::Custom(message) => message,
        ParseErrorKind::Basic(BasicParseErrorKind::EndOfInput) => {
            "unexpected end of selector".to_string()
        }
        ParseErrorKind::Basic(BasicParseErrorKind::UnexpectedToken(token)) => {
            format!("unexpected `{}`", token.to_css_string())
        }
        ParseErrorKind::Basic(other) => format!("{other:?}"),
    };
    format!("{message} at column {column}")
}
