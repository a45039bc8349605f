//! End-to-end tests for template rewriting with configured options.

use pretty_assertions::assert_eq;
use zero_mapper::Opts;
use zero_mapper::error::Error;
use zero_mapper::sql::{ParamValue, Params, Rewriter, StatementKind, TokenKind, classify, render};
use zero_mapper::value::Value;

#[test]
fn params_from_pairs() {
    let params: Params = [("@id", Value::from(1)), (":Name", Value::from("x"))]
        .into_iter()
        .collect();
    assert_eq!(params.len(), 2);
    assert_eq!(params.get("ID"), Some(&ParamValue::Scalar(Value::from(1))));
    assert_eq!(params.get("name"), Some(&ParamValue::Scalar(Value::from("x"))));
    assert_eq!(params.get_index(1).map(|(name, _)| name), Some("Name"));
}

#[test]
fn rebinding_replaces_in_place() {
    let params = Params::new()
        .bind("a", 1)
        .bind("b", 2)
        .bind_list("A", [3, 4]);
    assert_eq!(params.len(), 2);
    assert!(params.get("a").is_some_and(ParamValue::is_list));
    assert_eq!(params.get_index(0).map(|(_, v)| v.kind()), Some("list"));
}

#[test]
fn options_from_string() {
    let opts = Opts::try_from(
        "list_separator=|;empty_list_sql=(SELECT 1 WHERE 0 = 1);pad_lists=yes;list_padding_threshold=2",
    )
    .unwrap();
    let rewriter = Rewriter::new(opts);

    let out = rewriter
        .rewrite(
            "UPDATE t SET seen = 1 WHERE id IN @ids",
            &Params::new().bind_list("ids", [5, 6, 7]),
        )
        .unwrap();
    assert_eq!(out.bindings.len(), 10);
    assert!(out.sql.starts_with("UPDATE t SET seen = 1 WHERE id IN (@ids_0|@ids_1|"));
    assert_eq!(out.bindings[9], ("ids_9".to_owned(), Value::from(7)));

    let empty = rewriter
        .rewrite(
            "SELECT * FROM t WHERE id IN @ids",
            &Params::new().bind_list("ids", Vec::<i32>::new()),
        )
        .unwrap();
    assert_eq!(empty.sql, "SELECT * FROM t WHERE id IN (SELECT 1 WHERE 0 = 1)");
}

#[test]
fn render_reuses_a_parsed_template() {
    let rewriter = Rewriter::default();
    let parsed = rewriter.parse("SELECT * FROM t WHERE a = :a AND b IN :b");
    let kinds: Vec<TokenKind> = parsed.tokens().iter().map(|t| t.kind).collect();
    assert_eq!(kinds, vec![TokenKind::Named, TokenKind::ListExpansion]);

    for n in 1..=3 {
        let params = Params::new().bind("a", n).bind_list("b", 0..n);
        let out = render(&parsed, &params, rewriter.opts()).unwrap();
        assert_eq!(out.bindings.len(), 1 + n as usize);
    }
    assert_eq!(rewriter.len(), 1);
}

#[test]
fn statement_kinds() {
    assert_eq!(classify("sp_who"), StatementKind::Procedure);
    assert_eq!(classify("Vacuum"), StatementKind::Control);
    assert_eq!(classify("SELECT 1"), StatementKind::Text);
    assert_eq!(classify("exec:proc"), StatementKind::Text);
    assert_eq!(classify(""), StatementKind::Text);
}

#[test]
fn invalid_option_strings() {
    assert!(matches!(
        Opts::try_from("pad_lists=maybe"),
        Err(Error::InvalidInput(_))
    ));
    assert!(matches!(
        Opts::try_from("nope=1"),
        Err(Error::InvalidInput(_))
    ));
}
