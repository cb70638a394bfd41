use super::lexer::Token;
use crate::value::Value;
use chumsky::{input::ValueInput, pratt::*, prelude::*};

pub type Span = SimpleSpan;
pub type ParseError<'code, T> = Rich<'code, T, Span>;

#[derive(Debug, Clone, PartialEq)]
pub struct Spanned<T> {
    pub span: Span,
    pub node: T,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    Declaration {
        kind: DeclarationKind,
        name: String,
        value: Option<Spanned<Expression>>,
    },
    Assignment {
        name: String,
        operator: AssignmentOperator,
        value: Spanned<Expression>,
    },
    If {
        condition: Spanned<Expression>,
        then: Vec<Spanned<Statement>>,
        otherwise: Vec<Spanned<Statement>>,
    },
    /// `for (x of items)` and `for (key in object)`.
    ForEach {
        binding: String,
        kind: LoopKind,
        iterable: Spanned<Expression>,
        body: Vec<Spanned<Statement>>,
    },
    /// `for (init; condition; step)`.
    For {
        init: Option<Box<Spanned<Statement>>>,
        condition: Option<Spanned<Expression>>,
        step: Option<Box<Spanned<Statement>>>,
        body: Vec<Spanned<Statement>>,
    },
    Expression(Spanned<Expression>),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DeclarationKind {
    Let,
    Const,
    /// Hoisted to the outermost frame.
    Var,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AssignmentOperator {
    Set,
    Add,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LoopKind {
    Of,
    In,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    Literal(Value),
    Alias(String),
    This,
    List(Vec<Spanned<Self>>),
    Object(Vec<(String, Spanned<Self>)>),
    Member {
        object: Box<Spanned<Self>>,
        property: String,
    },
    Index {
        object: Box<Spanned<Self>>,
        index: Box<Spanned<Self>>,
    },
    Call {
        callee: Box<Spanned<Self>>,
        arguments: Vec<Spanned<Self>>,
    },
    Unary {
        operator: UnaryOperator,
        operand: Box<Spanned<Self>>,
    },
    Binary {
        operator: BinaryOperator,
        operand_a: Box<Spanned<Self>>,
        operand_b: Box<Spanned<Self>>,
    },
    Conditional {
        condition: Box<Spanned<Self>>,
        then: Box<Spanned<Self>>,
        otherwise: Box<Spanned<Self>>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UnaryOperator {
    Not,
    Negate,
    Plus,
    Typeof,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BinaryOperator {
    Multiply,
    Divide,
    Remainder,
    Add,
    Subtract,
    Less,
    LessOrEqual,
    Greater,
    GreaterOrEqual,
    Equal,
    NotEqual,
    StrictEqual,
    StrictNotEqual,
    And,
    Or,
}

enum Postfix {
    Member(String),
    Index(Spanned<Expression>),
    Call(Vec<Spanned<Expression>>),
}

fn boxed(expression: Spanned<Expression>) -> Box<Spanned<Expression>> {
    Box::new(expression)
}

pub fn expression<'code, I>()
-> impl Parser<'code, I, Spanned<Expression>, extra::Err<ParseError<'code, Token<'code>>>> + Clone
where
    I: ValueInput<'code, Token = Token<'code>, Span = Span>,
{
    recursive(|expression| {
        let comma = just(Token::Comma);
        let colon = just(Token::Colon);

        let identifier = select! { Token::Identifier(identifier) => identifier.to_owned() };

        let literal = select! {
            Token::Number(number) => Value::Number(number),
            Token::Text(text) => Value::String(text),
            Token::True => Value::Bool(true),
            Token::False => Value::Bool(false),
            Token::Null => Value::Null,
            Token::Undefined => Value::Null,
        }
        .map(Expression::Literal);

        let list = expression
            .clone()
            .separated_by(comma.clone())
            .allow_trailing()
            .collect()
            .delimited_by(
                just(Token::BracketSquareOpen),
                just(Token::BracketSquareClose),
            )
            .map(Expression::List);

        let key = select! {
            Token::Identifier(identifier) => identifier.to_owned(),
            Token::Text(text) => text,
        };

        let object = key
            .then_ignore(colon.clone())
            .then(expression.clone())
            .separated_by(comma.clone())
            .allow_trailing()
            .collect()
            .delimited_by(just(Token::BracketCurlyOpen), just(Token::BracketCurlyClose))
            .map(Expression::Object);

        let atom = choice((
            literal,
            just(Token::This).to(Expression::This),
            identifier.clone().map(Expression::Alias),
            list,
            object,
        ));

        let nested = expression
            .clone()
            .delimited_by(just(Token::BracketRoundOpen), just(Token::BracketRoundClose));

        let member = just(Token::Dot).ignore_then(identifier).map(Postfix::Member);

        let index = expression
            .clone()
            .delimited_by(just(Token::BracketSquareOpen), just(Token::BracketSquareClose))
            .map(Postfix::Index);

        let call = expression
            .clone()
            .separated_by(comma)
            .allow_trailing()
            .collect()
            .delimited_by(just(Token::BracketRoundOpen), just(Token::BracketRoundClose))
            .map(Postfix::Call);

        let unary = select! {
            Token::Not => UnaryOperator::Not,
            Token::Minus => UnaryOperator::Negate,
            Token::Plus => UnaryOperator::Plus,
            Token::Typeof => UnaryOperator::Typeof,
        };

        let multiplicative = select! {
            Token::Asterisk => BinaryOperator::Multiply,
            Token::Slash => BinaryOperator::Divide,
            Token::Percent => BinaryOperator::Remainder,
        };
        let additive = select! {
            Token::Plus => BinaryOperator::Add,
            Token::Minus => BinaryOperator::Subtract,
        };
        let relational = select! {
            Token::Less => BinaryOperator::Less,
            Token::LessOrEqual => BinaryOperator::LessOrEqual,
            Token::Greater => BinaryOperator::Greater,
            Token::GreaterOrEqual => BinaryOperator::GreaterOrEqual,
        };
        let equality = select! {
            Token::Equal => BinaryOperator::Equal,
            Token::NotEqual => BinaryOperator::NotEqual,
            Token::StrictEqual => BinaryOperator::StrictEqual,
            Token::StrictNotEqual => BinaryOperator::StrictNotEqual,
        };

        let binary = |operand_a, operator, operand_b, span| Spanned {
            span,
            node: Expression::Binary {
                operator,
                operand_a: boxed(operand_a),
                operand_b: boxed(operand_b),
            },
        };

        // `? then :` is parsed as the operator of a right-associative infix
        let conditional = just(Token::Question)
            .ignore_then(expression.clone())
            .then_ignore(colon);

        atom.map_with(|expression, extra| Spanned {
            node: expression,
            span: extra.span(),
        })
        .or(nested)
        .pratt((
            postfix(10, member.or(index).or(call), |object, postfix, extra| {
                let object = boxed(object);
                let node = match postfix {
                    Postfix::Member(property) => Expression::Member { object, property },
                    Postfix::Index(index) => Expression::Index {
                        object,
                        index: boxed(index),
                    },
                    Postfix::Call(arguments) => Expression::Call {
                        callee: object,
                        arguments,
                    },
                };
                Spanned {
                    node,
                    span: extra.span(),
                }
            }),
            prefix(9, unary, |operator, operand, extra| Spanned {
                node: Expression::Unary {
                    operator,
                    operand: boxed(operand),
                },
                span: extra.span(),
            }),
            infix(left(7), multiplicative, move |l, op, r, extra| binary(l, op, r, extra.span())),
            infix(left(6), additive, move |l, op, r, extra| binary(l, op, r, extra.span())),
            infix(left(5), relational, move |l, op, r, extra| binary(l, op, r, extra.span())),
            infix(left(4), equality, move |l, op, r, extra| binary(l, op, r, extra.span())),
            infix(left(3), just(Token::And), move |l, _, r, extra| {
                binary(l, BinaryOperator::And, r, extra.span())
            }),
            infix(left(2), just(Token::Or), move |l, _, r, extra| {
                binary(l, BinaryOperator::Or, r, extra.span())
            }),
            infix(right(1), conditional, |condition, then, otherwise, extra| Spanned {
                node: Expression::Conditional {
                    condition: boxed(condition),
                    then: boxed(then),
                    otherwise: boxed(otherwise),
                },
                span: extra.span(),
            }),
        ))
    })
}

pub fn parser<'code, I>()
-> impl Parser<'code, I, Vec<Spanned<Statement>>, extra::Err<ParseError<'code, Token<'code>>>>
where
    I: ValueInput<'code, Token = Token<'code>, Span = Span>,
{
    let semicolons = just(Token::Semicolon).repeated();

    let statement = recursive(|statement| {
        let expression = expression();
        let identifier = select! { Token::Identifier(identifier) => identifier.to_owned() };
        let declaration_kind = select! {
            Token::Let => DeclarationKind::Let,
            Token::Const => DeclarationKind::Const,
            Token::Var => DeclarationKind::Var,
        };

        let declaration = declaration_kind
            .clone()
            .then(identifier.clone())
            .then(just(Token::Assign).ignore_then(expression.clone()).or_not())
            .map(|((kind, name), value)| Statement::Declaration { kind, name, value });

        let assignment_operator = select! {
            Token::Assign => AssignmentOperator::Set,
            Token::AddAssign => AssignmentOperator::Add,
        };

        let assignment = identifier
            .clone()
            .then(assignment_operator)
            .then(expression.clone())
            .map(|((name, operator), value)| Statement::Assignment {
                name,
                operator,
                value,
            });

        // `i++` / `i--` as statements only
        let step = identifier
            .clone()
            .then(select! { Token::Increment => 1.0, Token::Decrement => -1.0 })
            .map_with(|(name, delta), extra| Statement::Assignment {
                name,
                operator: AssignmentOperator::Add,
                value: Spanned {
                    node: Expression::Literal(Value::Number(delta)),
                    span: extra.span(),
                },
            });

        let simple = choice((
            declaration,
            assignment,
            step,
            expression.clone().map(Statement::Expression),
        ))
        .map_with(|statement, extra| Spanned {
            node: statement,
            span: extra.span(),
        });

        let block = statement
            .clone()
            .padded_by(semicolons.clone())
            .repeated()
            .collect::<Vec<_>>()
            .delimited_by(
                just(Token::BracketCurlyOpen).then(semicolons.clone()),
                just(Token::BracketCurlyClose),
            );

        // a single-statement body owns its trailing `;` so that `else` can follow
        let body = block.or(
            statement
                .clone()
                .then_ignore(semicolons.clone())
                .map(|statement| vec![statement]),
        );

        let if_ = just(Token::If)
            .ignore_then(
                expression
                    .clone()
                    .delimited_by(just(Token::BracketRoundOpen), just(Token::BracketRoundClose)),
            )
            .then(body.clone())
            .then(just(Token::Else).ignore_then(body.clone()).or_not())
            .map(|((condition, then), otherwise)| Statement::If {
                condition,
                then,
                otherwise: otherwise.unwrap_or_default(),
            });

        let loop_kind = just(Token::Identifier("of"))
            .to(LoopKind::Of)
            .or(just(Token::In).to(LoopKind::In));

        let for_each = just(Token::For)
            .ignore_then(
                declaration_kind
                    .or_not()
                    .ignore_then(identifier)
                    .then(loop_kind)
                    .then(expression.clone())
                    .delimited_by(just(Token::BracketRoundOpen), just(Token::BracketRoundClose)),
            )
            .then(body.clone())
            .map(|(((binding, kind), iterable), body)| Statement::ForEach {
                binding,
                kind,
                iterable,
                body,
            });

        let for_ = just(Token::For)
            .ignore_then(
                simple
                    .clone()
                    .or_not()
                    .then_ignore(just(Token::Semicolon))
                    .then(expression.or_not())
                    .then_ignore(just(Token::Semicolon))
                    .then(simple.clone().or_not())
                    .delimited_by(just(Token::BracketRoundOpen), just(Token::BracketRoundClose)),
            )
            .then(body)
            .map(|(((init, condition), step), body)| Statement::For {
                init: init.map(Box::new),
                condition,
                step: step.map(Box::new),
                body,
            });

        choice((
            if_.map_with(|statement, extra| Spanned {
                node: statement,
                span: extra.span(),
            }),
            for_each.map_with(|statement, extra| Spanned {
                node: statement,
                span: extra.span(),
            }),
            for_.map_with(|statement, extra| Spanned {
                node: statement,
                span: extra.span(),
            }),
            simple,
        ))
    });

    statement
        .padded_by(semicolons)
        .repeated()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::super::lexer::lexer;
    use super::*;

    fn try_parse(code: &str) -> Result<Vec<Statement>, usize> {
        let tokens = lexer().parse(code).into_output().unwrap();
        let end = Span::from(code.len()..code.len());
        let input = tokens.as_slice().map(end, |Spanned { node, span }| (node, span));
        parser()
            .parse(input)
            .into_result()
            .map(|statements| statements.into_iter().map(|statement| statement.node).collect())
            .map_err(|errors| errors.len())
    }

    fn parse(code: &str) -> Vec<Statement> {
        try_parse(code).unwrap()
    }

    fn single_expression(code: &str) -> Expression {
        match parse(code).into_iter().next() {
            Some(Statement::Expression(expression)) => expression.node,
            other => panic!("Expected expression statement, got {other:?}"),
        }
    }

    #[test]
    fn test_precedence() {
        let Expression::Binary { operator, operand_b, .. } = single_expression("1 + 2 * 3") else {
            panic!("Expected binary expression");
        };
        assert_eq!(operator, BinaryOperator::Add);
        assert!(matches!(
            operand_b.node,
            Expression::Binary { operator: BinaryOperator::Multiply, .. }
        ));
    }

    #[test]
    fn test_member_call_chain() {
        let Expression::Call { callee, arguments } = single_expression("this.state.items.join(', ')") else {
            panic!("Expected call");
        };
        assert_eq!(arguments.len(), 1);
        assert!(matches!(callee.node, Expression::Member { ref property, .. } if property == "join"));
    }

    #[test]
    fn test_conditional_is_right_associative() {
        let Expression::Conditional { otherwise, .. } = single_expression("a ? 'x' : b ? 'y' : 'z'") else {
            panic!("Expected conditional");
        };
        assert!(matches!(otherwise.node, Expression::Conditional { .. }));
    }

    #[test]
    fn test_if_else_chain() {
        let statements = parse("if (a) { print('1'); } else if (b) print('2'); else { print('3') }");
        let [Statement::If { then, otherwise, .. }] = statements.as_slice() else {
            panic!("Expected one if statement, got {statements:?}");
        };
        assert_eq!(then.len(), 1);
        assert!(matches!(otherwise[0].node, Statement::If { .. }));
    }

    #[test]
    fn test_loops() {
        let statements = parse("for (const item of items) { print(item) }\nfor (var i = 0; i < 3; i++) print(i)");
        assert!(matches!(
            statements[0],
            Statement::ForEach { kind: LoopKind::Of, ref binding, .. } if binding == "item"
        ));
        assert!(matches!(statements[1], Statement::For { init: Some(_), condition: Some(_), step: Some(_), .. }));
    }

    #[test]
    fn test_single_statement_bodies_take_their_semicolon() {
        let statements = parse("if (a) print('1'); else print('2'); print('3');");
        assert_eq!(statements.len(), 2);
        let Statement::If { then, otherwise, .. } = &statements[0] else {
            panic!("Expected if statement, got {:?}", statements[0]);
        };
        assert_eq!((then.len(), otherwise.len()), (1, 1));

        let statements = parse("for (const x of xs) print(x);; print('done')");
        assert_eq!(statements.len(), 2);
    }

    #[test]
    fn test_unbalanced_block_fails() {
        assert!(try_parse("if (a) { print('x');").is_err());
    }
}
