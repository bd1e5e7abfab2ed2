use log::debug;

use crate::code::{
    action, any, any_except, charset, choice, consume, join, literal, lookaround, not,
    one_or_more, optional, rule_ref, sequence, string, zero_or_more, zero_or_one, Action,
};
use crate::vm::{Error, Status};
use crate::{format, CharSet, Grammar, Value};

#[test]
fn scenario_literal() {
    let mut g = Grammar::new();
    g.define("s", literal("a"), None);
    let (status, cursor, _) = parse_one(&g, "s", "abc");
    assert_eq!(Status::Success, status);
    assert_eq!(1, cursor);
}

#[test]
fn scenario_charset() {
    let mut g = Grammar::new();
    g.define("s", charset("abcd"), None);

    let (status, cursor, _) = parse_one(&g, "s", "efg");
    assert_eq!(Status::Failure, status);
    assert_eq!(0, cursor);

    let (status, cursor, result) = parse_one(&g, "s", "bc");
    assert_eq!(Status::Success, status);
    assert_eq!(1, cursor);
    assert_eq!(Some(Value::List(vec![Value::Char('b')])), result);
}

#[test]
fn scenario_alternation() {
    let mut g = Grammar::new();
    g.define("s", choice([literal("a"), literal("b")]), None);
    for (input, expected_status, expected_cursor) in [
        ("abc", Status::Success, 1),
        ("bc", Status::Success, 1),
        ("c", Status::Failure, 0),
    ] {
        let (status, cursor, _) = parse_one(&g, "s", input);
        assert_eq!(expected_status, status, "input {:?}", input);
        assert_eq!(expected_cursor, cursor, "input {:?}", input);
    }
}

#[test]
fn scenario_repetition() {
    let mut g = Grammar::new();
    g.define("s", sequence([zero_or_more(literal("a")), literal("b")]), None);
    for (input, expected_cursor) in [("bc", 1), ("abc", 2), ("aabc", 3)] {
        let (status, cursor, _) = parse_one(&g, "s", input);
        assert_eq!(Status::Success, status, "input {:?}", input);
        assert_eq!(expected_cursor, cursor, "input {:?}", input);
    }
}

#[test]
fn scenario_csv() {
    let g = csv_grammar();
    let (status, _, result) = parse_one(&g, "csv", "Here,are,\"some,CSV\",data");
    assert_eq!(Status::Success, status);
    assert_eq!(
        Some(Value::List(vec![
            Value::Str("Here".to_string()),
            Value::Str("are".to_string()),
            Value::Str("some,CSV".to_string()),
            Value::Str("data".to_string()),
        ])),
        result
    );
}

#[test]
fn scenario_csv_fed_in_chunks() {
    let g = csv_grammar();
    let mut p = g.parser("csv", ());
    for chunk in ["Here,a", "re,\"some,", "CSV\",data"] {
        p.accept(chunk).expect("unexpected machine error");
    }
    p.run().expect("unexpected machine error");
    assert_eq!(Status::Success, p.status());
    assert_eq!(
        parse_one(&g, "csv", "Here,are,\"some,CSV\",data").2,
        p.result()
    );
}

#[test]
fn scenario_calculator() {
    let g = calculator_grammar();
    let (status, cursor, result) = parse_one(&g, "sum", "1+23+4*15");
    assert_eq!(Status::Success, status);
    assert_eq!(9, cursor);
    assert_eq!(Some(Value::I64(84)), result);
}

#[test]
fn scenario_calculator_precedence() {
    let g = calculator_grammar();
    assert_eq!(Some(Value::I64(7)), parse_one(&g, "sum", "1+2*3").2);
    assert_eq!(Some(Value::I64(42)), parse_one(&g, "sum", "42").2);
}

#[test]
fn scenario_word_boundaries() {
    // wb   <- a negative lookbehind: no word scalar right before
    // word <- wb [ab]+
    let mut g = Grammar::new();
    let wb = g.define("wb", lookaround(-1, charset("ab")), None);
    g.define(
        "word",
        sequence([wb, one_or_more(charset("ab"))]),
        Some(join_text()),
    );
    let mut p = g.parser("word", ());
    p.accept("aa bba   bbb").expect("unexpected machine error");
    let words: Vec<Value> = p
        .match_all()
        .collect::<Result<_, _>>()
        .expect("unexpected machine error");
    assert_eq!(
        vec![
            Value::Str("aa".to_string()),
            Value::Str("bba".to_string()),
            Value::Str("bbb".to_string()),
        ],
        words
    );
}

#[test]
fn scenario_identifier_scan() {
    // ident <- [a-zA-Z_] [a-zA-Z0-9_]*
    let head = CharSet::new(["a-z", "A-Z", "_"]);
    let tail = head.union("0-9");
    let mut g = Grammar::new();
    g.define(
        "ident",
        string(sequence([charset(head), zero_or_more(charset(tail))])),
        Some(action(|_cx: &mut (), mut values| {
            Ok(values.pop().unwrap_or(Value::Absent))
        })),
    );
    let mut p = g.parser("ident", ());
    p.accept("x1 = _foo + bar9;").expect("unexpected machine error");
    let found: Vec<Value> = p
        .match_all()
        .collect::<Result<_, _>>()
        .expect("unexpected machine error");
    assert_eq!(
        vec![
            Value::Str("x1".to_string()),
            Value::Str("_foo".to_string()),
            Value::Str("bar9".to_string()),
        ],
        found
    );
}

#[test]
fn optional_pushes_its_default() {
    let mut g = Grammar::new();
    g.define(
        "s",
        sequence([literal("a"), optional(literal("!"), Value::Bool(false))]),
        None,
    );
    let (_, _, result) = parse_one(&g, "s", "a");
    assert_eq!(
        Some(Value::List(vec![Value::Char('a'), Value::Bool(false)])),
        result
    );
    let (_, _, result) = parse_one(&g, "s", "a!");
    assert_eq!(
        Some(Value::List(vec![Value::Char('a'), Value::Char('!')])),
        result
    );
}

#[test]
fn empty_input_against_an_empty_capable_grammar() {
    let mut g = Grammar::new();
    g.define("s", zero_or_more(literal("a")), None);
    let (status, cursor, _) = parse_one(&g, "s", "");
    assert_eq!(Status::Success, status);
    assert_eq!(0, cursor);
}

#[test]
fn any_except_scans_up_to_a_delimiter() {
    let mut g = Grammar::new();
    g.define("s", join(zero_or_more(any_except([";"]))), None);
    let (status, cursor, result) = parse_one(&g, "s", "abc;def");
    assert_eq!(Status::Success, status);
    assert_eq!(3, cursor);
    assert_eq!(
        Some(Value::List(vec![Value::Str("abc".to_string())])),
        result
    );
}

#[test]
fn match_all_surfaces_grammar_errors() {
    let mut g = Grammar::new();
    g.define("s", rule_ref("nowhere"), None);
    let mut p = g.parser("s", ());
    let first = p.match_all().next();
    assert_eq!(
        Some(Err(Error::RuleNotFound("nowhere".to_string()))),
        first
    );
}

// -- Grammars -------------------------------------------------------------

// csv    <- data (~',' data)*
// data   <- quoted / value
// value  <- (!',' .)*            -> text
// quoted <- ~'"' (!'"' .)* ~'"'  -> text
fn csv_grammar() -> Grammar {
    let mut g = Grammar::new();
    let value = g.define(
        "value",
        zero_or_more(sequence([not(literal(",")), any()])),
        Some(join_text()),
    );
    let quoted = g.define(
        "quoted",
        sequence([
            consume(literal("\"")),
            zero_or_more(sequence([not(literal("\"")), any()])),
            consume(literal("\"")),
        ]),
        Some(join_text()),
    );
    let data = g.define(
        "data",
        choice([quoted, value]),
        Some(action(|_cx: &mut (), mut values| {
            Ok(values.pop().unwrap_or(Value::Absent))
        })),
    );
    g.define(
        "csv",
        sequence([
            data.clone(),
            zero_or_more(sequence([consume(literal(",")), data])),
        ]),
        None,
    );
    g
}

// sum     <- product ('+' sum)?   -> fold +
// product <- term ('*' product)?  -> fold *
// term    <- [0-9]+               -> integer
fn calculator_grammar() -> Grammar {
    let mut g = Grammar::new();
    g.define(
        "term",
        one_or_more(charset("0-9")),
        Some(action(|_cx: &mut (), values| {
            let digits: String = values.iter().map(format::value_text).collect();
            digits
                .parse::<i64>()
                .map(Value::I64)
                .map_err(|e| Error::Action(e.to_string()))
        })),
    );
    g.define(
        "product",
        sequence([
            rule_ref("term"),
            zero_or_one(sequence([literal("*"), rule_ref("product")])),
        ]),
        Some(fold(|a, b| a * b)),
    );
    g.define(
        "sum",
        sequence([
            rule_ref("product"),
            zero_or_one(sequence([literal("+"), rule_ref("sum")])),
        ]),
        Some(fold(|a, b| a + b)),
    );
    g
}

// -- Helpers --------------------------------------------------------------

fn parse_one(g: &Grammar, start: &str, input: &str) -> (Status, usize, Option<Value>) {
    debug!("g:\n{}", g);
    let mut p = g.parser(start, ());
    let result = p.parse(input).expect("unexpected machine error");
    (p.status(), p.cursor(), result)
}

fn join_text<C: 'static>() -> Action<C> {
    action(|_cx: &mut C, values: Vec<Value>| {
        Ok(Value::Str(values.iter().map(format::value_text).collect()))
    })
}

fn fold(op: fn(i64, i64) -> i64) -> Action<()> {
    action(move |_cx: &mut (), values| match values.as_slice() {
        [Value::I64(a), Value::Absent] => Ok(Value::I64(*a)),
        [Value::I64(a), Value::Char(_), Value::I64(b)] => Ok(Value::I64(op(*a, *b))),
        _ => Err(Error::Action(format!("malformed operands: {:?}", values))),
    })
}
