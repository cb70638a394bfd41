use super::parser::{ParseError, Spanned};
use chumsky::prelude::*;
use std::borrow::Cow;
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum Token<'code> {
    BracketRoundOpen,
    BracketRoundClose,
    BracketCurlyOpen,
    BracketCurlyClose,
    BracketSquareOpen,
    BracketSquareClose,
    Comment(&'code str),
    Number(f64),
    // escapes already decoded
    Text(String),
    Identifier(&'code str),
    Colon,
    Semicolon,
    Comma,
    Dot,
    Question,
    StrictEqual,
    StrictNotEqual,
    Equal,
    NotEqual,
    GreaterOrEqual,
    Greater,
    LessOrEqual,
    Less,
    And,
    Or,
    Not,
    Increment,
    Decrement,
    AddAssign,
    Assign,
    Minus,
    Plus,
    Asterisk,
    Slash,
    Percent,
    If,
    Else,
    For,
    In,
    Let,
    Const,
    Var,
    True,
    False,
    Null,
    Undefined,
    This,
    Typeof,
}

impl<'code> Token<'code> {
    pub fn into_cow_str(self) -> Cow<'code, str> {
        match self {
            Self::BracketRoundOpen => "(".into(),
            Self::BracketRoundClose => ")".into(),
            Self::BracketCurlyOpen => "{".into(),
            Self::BracketCurlyClose => "}".into(),
            Self::BracketSquareOpen => "[".into(),
            Self::BracketSquareClose => "]".into(),
            Self::Comment(comment) => comment.into(),
            Self::Number(number) => number.to_string().into(),
            Self::Text(text) => format!("'{text}'").into(),
            Self::Identifier(identifier) => identifier.into(),
            Self::Colon => ":".into(),
            Self::Semicolon => ";".into(),
            Self::Comma => ",".into(),
            Self::Dot => ".".into(),
            Self::Question => "?".into(),
            Self::StrictEqual => "===".into(),
            Self::StrictNotEqual => "!==".into(),
            Self::Equal => "==".into(),
            Self::NotEqual => "!=".into(),
            Self::GreaterOrEqual => ">=".into(),
            Self::Greater => ">".into(),
            Self::LessOrEqual => "<=".into(),
            Self::Less => "<".into(),
            Self::And => "&&".into(),
            Self::Or => "||".into(),
            Self::Not => "!".into(),
            Self::Increment => "++".into(),
            Self::Decrement => "--".into(),
            Self::AddAssign => "+=".into(),
            Self::Assign => "=".into(),
            Self::Minus => "-".into(),
            Self::Plus => "+".into(),
            Self::Asterisk => "*".into(),
            Self::Slash => "/".into(),
            Self::Percent => "%".into(),
            Self::If => "if".into(),
            Self::Else => "else".into(),
            Self::For => "for".into(),
            Self::In => "in".into(),
            Self::Let => "let".into(),
            Self::Const => "const".into(),
            Self::Var => "var".into(),
            Self::True => "true".into(),
            Self::False => "false".into(),
            Self::Null => "null".into(),
            Self::Undefined => "undefined".into(),
            Self::This => "this".into(),
            Self::Typeof => "typeof".into(),
        }
    }
}

impl fmt::Display for Token<'_> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.clone().into_cow_str())
    }
}

pub fn lexer<'code>()
-> impl Parser<'code, &'code str, Vec<Spanned<Token<'code>>>, extra::Err<ParseError<'code, char>>> {
    let bracket = choice((
        just('(').to(Token::BracketRoundOpen),
        just(')').to(Token::BracketRoundClose),
        just('{').to(Token::BracketCurlyOpen),
        just('}').to(Token::BracketCurlyClose),
        just('[').to(Token::BracketSquareOpen),
        just(']').to(Token::BracketSquareClose),
    ));

    // longest operators first
    let comparator = choice((
        just("===").to(Token::StrictEqual),
        just("!==").to(Token::StrictNotEqual),
        just("==").to(Token::Equal),
        just("!=").to(Token::NotEqual),
        just(">=").to(Token::GreaterOrEqual),
        just('>').to(Token::Greater),
        just("<=").to(Token::LessOrEqual),
        just('<').to(Token::Less),
    ));

    let logical_operator = choice((
        just("&&").to(Token::And),
        just("||").to(Token::Or),
        just('!').to(Token::Not),
    ));

    let arithmetic_operator = choice((
        just("++").to(Token::Increment),
        just("--").to(Token::Decrement),
        just("+=").to(Token::AddAssign),
        just('=').to(Token::Assign),
        just('-').to(Token::Minus),
        just('+').to(Token::Plus),
        just('*').to(Token::Asterisk),
        just('/').to(Token::Slash),
        just('%').to(Token::Percent),
    ));

    let punctuation = choice((
        just(':').to(Token::Colon),
        just(';').to(Token::Semicolon),
        just(',').to(Token::Comma),
        just('.').to(Token::Dot),
        just('?').to(Token::Question),
    ));

    let line_comment = just("//")
        .then(any().and_is(text::newline().not()).repeated())
        .to_slice();

    let block_comment = just("/*")
        .then(any().and_is(just("*/").not()).repeated())
        .then(just("*/"))
        .to_slice();

    let comment = line_comment.or(block_comment).map(Token::Comment);

    let number = text::int(10)
        .then(just('.').then(text::digits(10)).or_not())
        .to_slice()
        .from_str()
        .unwrapped()
        .map(Token::Number);

    let escape = just('\\').ignore_then(choice((
        just('\\'),
        just('\''),
        just('"'),
        just('n').to('\n'),
        just('r').to('\r'),
        just('t').to('\t'),
        just('0').to('\0'),
        just('u').ignore_then(text::digits(16).exactly(4).to_slice().validate(
            |digits: &str, extra, emitter| {
                u32::from_str_radix(digits, 16)
                    .ok()
                    .and_then(char::from_u32)
                    .unwrap_or_else(|| {
                        emitter.emit(ParseError::custom(extra.span(), "invalid unicode escape"));
                        char::REPLACEMENT_CHARACTER
                    })
            },
        )),
    )));

    let single_quoted = just('\'')
        .ignore_then(
            none_of("\\'")
                .or(escape.clone())
                .repeated()
                .collect::<String>(),
        )
        .then_ignore(just('\''));

    let double_quoted = just('"')
        .ignore_then(none_of("\\\"").or(escape).repeated().collect::<String>())
        .then_ignore(just('"'));

    let text = single_quoted.or(double_quoted).map(Token::Text);

    let identifier_or_keyword = any()
        .filter(|character: &char| character.is_ascii_alphabetic() || matches!(character, '_' | '$'))
        .then(
            any()
                .filter(|character: &char| {
                    character.is_ascii_alphanumeric() || matches!(character, '_' | '$')
                })
                .repeated(),
        )
        .to_slice()
        .map(|identifier: &str| match identifier {
            "if" => Token::If,
            "else" => Token::Else,
            "for" => Token::For,
            "in" => Token::In,
            "let" => Token::Let,
            "const" => Token::Const,
            "var" => Token::Var,
            "true" => Token::True,
            "false" => Token::False,
            "null" => Token::Null,
            "undefined" => Token::Undefined,
            "this" => Token::This,
            "typeof" => Token::Typeof,
            _ => Token::Identifier(identifier),
        });

    let token = choice((
        bracket,
        comment,
        number,
        text,
        comparator,
        logical_operator,
        arithmetic_operator,
        punctuation,
        identifier_or_keyword,
    ));

    token
        .map_with(|token, extra| Spanned {
            node: token,
            span: extra.span(),
        })
        .padded()
        .recover_with(skip_then_retry_until(any().ignored(), end()))
        .repeated()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(code: &str) -> Vec<Token<'_>> {
        lexer()
            .parse(code)
            .into_output()
            .unwrap()
            .into_iter()
            .map(|token| token.node)
            .collect()
    }

    #[test]
    fn test_operators_prefer_longest_match() {
        assert_eq!(
            tokens("a === b !== c == d = e += 1 i++"),
            vec![
                Token::Identifier("a"),
                Token::StrictEqual,
                Token::Identifier("b"),
                Token::StrictNotEqual,
                Token::Identifier("c"),
                Token::Equal,
                Token::Identifier("d"),
                Token::Assign,
                Token::Identifier("e"),
                Token::AddAssign,
                Token::Number(1.),
                Token::Identifier("i"),
                Token::Increment,
            ]
        );
    }

    #[test]
    fn test_text_escapes_are_decoded() {
        assert_eq!(
            tokens(r#"'it\'s\n\u2028' "say \"hi\"""#),
            vec![
                Token::Text("it's\n\u{2028}".to_owned()),
                Token::Text("say \"hi\"".to_owned()),
            ]
        );
    }

    #[test]
    fn test_keywords_and_comments() {
        assert_eq!(
            tokens("if (x) /* note */ { y } // tail\nelse typeof of"),
            vec![
                Token::If,
                Token::BracketRoundOpen,
                Token::Identifier("x"),
                Token::BracketRoundClose,
                Token::Comment("/* note */"),
                Token::BracketCurlyOpen,
                Token::Identifier("y"),
                Token::BracketCurlyClose,
                Token::Comment("// tail"),
                Token::Else,
                Token::Typeof,
                Token::Identifier("of"),
            ]
        );
    }

    #[test]
    fn test_unterminated_text_is_an_error() {
        let (_, errors) = lexer().parse("'open").into_output_errors();
        assert!(!errors.is_empty());
    }
}
