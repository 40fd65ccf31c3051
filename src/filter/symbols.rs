//! Replace the recognized sub-expressions of a filter string with symbols.
//!
//! The categories are applied in a fixed order: scoped expressions, basic
//! comparisons, set membership and gene regions.  Each match is replaced by
//! a fresh symbol so later categories never look into an earlier match.  The
//! resulting string only consists of symbols, boolean keywords and
//! parentheses and is handed to `dnf::normalize()`.

use std::str::FromStr;

use regex::{Captures, Regex};

use crate::err::{ParseError, ParseErrorKind};

use super::schema::{CompareOp, ConditionTriple, ScopeKind};

/// The symbol alphabet, in allocation order.
pub const SYMBOL_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";

lazy_static::lazy_static! {
    /// Closing parenthesis of a scoped condition up to the opening
    /// parenthesis of the sample list, e.g., `) in ALL(`.
    static ref SCOPE_ANCHOR: Regex = Regex::new(
        r"\)\s*in\s+(?P<scope_type>[A-Za-z_]+)\s*\("
    ).expect("invalid regex in source code");

    /// Basic expression `KEY OP VALUE`.
    static ref COMPARISON: Regex = Regex::new(
        r#"(?P<key>[A-Za-z_][A-Za-z0-9_.]*)\s*(?P<delim>==|!=|>=|<=|>|<)\s*(?P<value>"[^"]*"|'[^']*'|[^\s()"']+)"#
    ).expect("invalid regex in source code");

    /// Set membership `IN_SET(uid)` or `NOT_IN_SET(uid)`.
    static ref SET: Regex = Regex::new(
        r"\b(?P<maybe_not>NOT_)?IN_SET\(\s*(?P<set>[^()]*?)\s*\)"
    ).expect("invalid regex in source code");

    /// Gene region `GENE(label)`.
    static ref GENE: Regex = Regex::new(
        r"\bGENE\(\s*(?P<gene>[^()]*?)\s*\)"
    ).expect("invalid regex in source code");
}

/// Opaque placeholder for a sub-expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Symbol(u8);

impl Symbol {
    /// The character representing the symbol in the symbolized string.
    pub fn as_char(&self) -> char {
        SYMBOL_ALPHABET[self.0 as usize] as char
    }

    /// Position of the symbol in allocation order.
    pub fn index(&self) -> usize {
        self.0 as usize
    }

    /// Symbol for `c`, if `c` is part of the alphabet.
    pub fn from_char(c: char) -> Option<Self> {
        SYMBOL_ALPHABET
            .iter()
            .position(|&s| s as char == c)
            .map(|pos| Symbol(pos as u8))
    }
}

impl std::fmt::Display for Symbol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_char())
    }
}

impl serde::Serialize for Symbol {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// A recognized sub-expression.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub enum SubExpression {
    /// `(EXPR) in SCOPE(s1,s2,...)`
    Scoped {
        /// The inner expression `EXPR`.
        condition: String,
        /// The scope type.
        kind: ScopeKind,
        /// The sample identifiers, trimmed.
        samples: Vec<String>,
    },
    /// `KEY OP VALUE`
    Comparison(ConditionTriple),
    /// `IN_SET(uid)` or `NOT_IN_SET(uid)`
    SetMembership { set_uid: String, negated: bool },
    /// `GENE(label)`
    GeneRegion { label: String },
}

/// One entry of the `SymbolTable`.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct SymbolEntry {
    /// The symbol.
    pub symbol: Symbol,
    /// The original text of the sub-expression.
    pub text: String,
    /// The parsed sub-expression.
    pub expression: SubExpression,
}

/// Mapping from symbol to sub-expression, with bounded allocation.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
#[serde(transparent)]
pub struct SymbolTable {
    entries: Vec<SymbolEntry>,
}

impl SymbolTable {
    /// Allocate the next symbol for `expression` matched as `text`.
    ///
    /// # Errors
    ///
    /// Returns a `ParseError` once the alphabet is exhausted.
    fn allocate(&mut self, text: &str, expression: SubExpression) -> Result<Symbol, ParseError> {
        if self.entries.len() >= SYMBOL_ALPHABET.len() {
            return Err(ParseError::new(
                text,
                ParseErrorKind::SymbolsExhausted(SYMBOL_ALPHABET.len()),
            ));
        }
        let symbol = Symbol(self.entries.len() as u8);
        self.entries.push(SymbolEntry {
            symbol,
            text: text.to_string(),
            expression,
        });
        Ok(symbol)
    }

    /// Return the entry for `symbol`, if allocated.
    pub fn get(&self, symbol: Symbol) -> Option<&SymbolEntry> {
        self.entries.get(symbol.index())
    }

    /// Number of allocated symbols.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no symbol has been allocated.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate over the entries in allocation order.
    pub fn iter(&self) -> impl Iterator<Item = &SymbolEntry> {
        self.entries.iter()
    }
}

/// Result of `symbolize()`.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct SymbolizedExpression {
    /// The fully symbolized string.
    pub symbolized: String,
    /// The symbols allocated on the way.
    pub table: SymbolTable,
}

/// Replace all recognized sub-expressions of `raw` with symbols.
///
/// # Errors
///
/// Returns a `ParseError` if a match violates the grammar of its category or
/// the number of sub-expressions exceeds the symbol alphabet.
pub fn symbolize(raw: &str) -> Result<SymbolizedExpression, ParseError> {
    let mut table = SymbolTable::default();
    let text = symbolize_scoped(raw, &mut table)?;
    let text = symbolize_category(&text, &COMPARISON, &mut table, parse_comparison)?;
    let text = symbolize_category(&text, &SET, &mut table, parse_set)?;
    let text = symbolize_category(&text, &GENE, &mut table, parse_gene)?;
    tracing::trace!("symbolized {:?} to {:?}", raw, &text);
    Ok(SymbolizedExpression {
        symbolized: text,
        table,
    })
}

/// Append the symbol for a match, padded so it cannot merge with its neighbours.
fn push_symbol(out: &mut String, symbol: Symbol) {
    out.push(' ');
    out.push(symbol.as_char());
    out.push(' ');
}

/// Replace all matches of `re` in `text`.
fn symbolize_category<F>(
    text: &str,
    re: &Regex,
    table: &mut SymbolTable,
    parse: F,
) -> Result<String, ParseError>
where
    F: Fn(&Captures) -> Result<SubExpression, ParseError>,
{
    let mut out = String::with_capacity(text.len());
    let mut last = 0;
    for caps in re.captures_iter(text) {
        let Some(whole) = caps.get(0) else {
            continue;
        };
        out.push_str(&text[last..whole.start()]);
        let symbol = table.allocate(whole.as_str(), parse(&caps)?)?;
        push_symbol(&mut out, symbol);
        last = whole.end();
    }
    out.push_str(&text[last..]);
    Ok(out)
}

/// Span of a scoped expression in the text.
struct ScopedSpan {
    start: usize,
    end: usize,
    condition_start: usize,
    condition_end: usize,
    scope_type: String,
    samples_start: usize,
    samples_end: usize,
}

/// Replace the outermost scoped expressions.
///
/// Regular expressions cannot match balanced parentheses, so only the
/// `) in SCOPE(` part is matched and the condition is found by walking back
/// to the matching opening parenthesis.  Scoped expressions nested in the
/// condition of another one stay untouched here; they are symbolized when
/// the condition itself is compiled.
fn symbolize_scoped(text: &str, table: &mut SymbolTable) -> Result<String, ParseError> {
    let mut spans: Vec<ScopedSpan> = Vec::new();
    for caps in SCOPE_ANCHOR.captures_iter(text) {
        let (Some(anchor), Some(scope_type)) = (caps.get(0), caps.name("scope_type")) else {
            continue;
        };
        let condition_end = anchor.start();
        let open = matching_open_paren(text, condition_end).ok_or_else(|| {
            ParseError::new(
                &text[..anchor.end()],
                ParseErrorKind::UnbalancedParentheses,
            )
        })?;
        let samples_start = anchor.end();
        let samples_end = text[samples_start..]
            .find(')')
            .map(|offset| samples_start + offset)
            .ok_or_else(|| {
                ParseError::new(&text[open..], ParseErrorKind::UnbalancedParentheses)
            })?;
        spans.push(ScopedSpan {
            start: open,
            end: samples_end + 1,
            condition_start: open + 1,
            condition_end,
            scope_type: scope_type.as_str().to_string(),
            samples_start,
            samples_end,
        });
    }

    // Inner anchors are found before the outer ones; keep outermost spans only.
    spans.sort_by_key(|span| (span.start, std::cmp::Reverse(span.end)));
    let mut out = String::with_capacity(text.len());
    let mut last = 0;
    for span in spans {
        if span.start < last {
            continue;
        }
        let whole = &text[span.start..span.end];
        let kind = ScopeKind::from_str(&span.scope_type)
            .map_err(|_| ParseError::new(whole, ParseErrorKind::UnknownScope))?;
        let samples = text[span.samples_start..span.samples_end]
            .split(',')
            .map(|sample| sample.trim())
            .filter(|sample| !sample.is_empty())
            .map(|sample| sample.to_string())
            .collect::<Vec<_>>();
        if samples.is_empty() {
            return Err(ParseError::new(whole, ParseErrorKind::EmptyScope));
        }
        let expression = SubExpression::Scoped {
            condition: text[span.condition_start..span.condition_end]
                .trim()
                .to_string(),
            kind,
            samples,
        };
        out.push_str(&text[last..span.start]);
        let symbol = table.allocate(whole, expression)?;
        push_symbol(&mut out, symbol);
        last = span.end;
    }
    out.push_str(&text[last..]);
    Ok(out)
}

/// Index of the `(` matching the `)` at `close`.
fn matching_open_paren(text: &str, close: usize) -> Option<usize> {
    let mut depth = 0usize;
    for (idx, c) in text[..=close].char_indices().rev() {
        match c {
            ')' => depth += 1,
            '(' => {
                depth -= 1;
                if depth == 0 {
                    return Some(idx);
                }
            }
            _ => (),
        }
    }
    None
}

fn parse_comparison(caps: &Captures) -> Result<SubExpression, ParseError> {
    let whole = caps.get(0).map(|m| m.as_str()).unwrap_or_default();
    let (Some(key), Some(delim), Some(value)) =
        (caps.name("key"), caps.name("delim"), caps.name("value"))
    else {
        return Err(ParseError::new(whole, ParseErrorKind::UnexpectedToken));
    };
    let op = CompareOp::from_str(delim.as_str())
        .map_err(|_| ParseError::new(whole, ParseErrorKind::UnexpectedToken))?;
    Ok(SubExpression::Comparison(ConditionTriple {
        op,
        key: key.as_str().to_string(),
        value: unquote(value.as_str()).to_string(),
    }))
}

fn parse_set(caps: &Captures) -> Result<SubExpression, ParseError> {
    let whole = caps.get(0).map(|m| m.as_str()).unwrap_or_default();
    let set_uid = caps.name("set").map(|m| m.as_str()).unwrap_or_default();
    if set_uid.is_empty() {
        return Err(ParseError::new(whole, ParseErrorKind::EmptySet));
    }
    Ok(SubExpression::SetMembership {
        set_uid: set_uid.to_string(),
        negated: caps.name("maybe_not").is_some(),
    })
}

fn parse_gene(caps: &Captures) -> Result<SubExpression, ParseError> {
    let whole = caps.get(0).map(|m| m.as_str()).unwrap_or_default();
    let label = caps.name("gene").map(|m| m.as_str()).unwrap_or_default();
    if label.is_empty() {
        return Err(ParseError::new(whole, ParseErrorKind::EmptyGene));
    }
    Ok(SubExpression::GeneRegion {
        label: label.to_string(),
    })
}

/// Strip one level of matching single or double quotes.
fn unquote(value: &str) -> &str {
    for quote in ['"', '\''] {
        if value.len() >= 2 && value.starts_with(quote) && value.ends_with(quote) {
            return &value[1..value.len() - 1];
        }
    }
    value
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use super::*;

    fn expressions(symbolized: &SymbolizedExpression) -> Vec<SubExpression> {
        symbolized
            .table
            .iter()
            .map(|entry| entry.expression.clone())
            .collect()
    }

    #[test]
    fn symbol_alphabet() {
        assert_eq!(SYMBOL_ALPHABET.len(), 52);
        assert_eq!(Symbol(0).as_char(), 'A');
        assert_eq!(Symbol(26).as_char(), 'a');
        assert_eq!(Symbol::from_char('z'), Some(Symbol(51)));
        assert_eq!(Symbol::from_char('1'), None);
    }

    #[test]
    fn symbolize_comparisons() -> Result<(), anyhow::Error> {
        let result = symbolize("position > 100 AND (INFO_DP <= 10 OR chromosome == 'chr 2')")?;
        assert_eq!(result.symbolized, " A  AND ( B  OR  C )");
        assert_eq!(
            expressions(&result),
            vec![
                SubExpression::Comparison(ConditionTriple {
                    op: CompareOp::Gt,
                    key: "position".into(),
                    value: "100".into()
                }),
                SubExpression::Comparison(ConditionTriple {
                    op: CompareOp::Le,
                    key: "INFO_DP".into(),
                    value: "10".into()
                }),
                SubExpression::Comparison(ConditionTriple {
                    op: CompareOp::Eq,
                    key: "chromosome".into(),
                    value: "chr 2".into()
                }),
            ]
        );

        Ok(())
    }

    #[test]
    fn symbolize_scoped_first() -> Result<(), anyhow::Error> {
        let result = symbolize("(position > 100) AND (GT_TYPE == HET) in ANY(A, B)")?;
        assert_eq!(result.symbolized, "( B ) AND  A ");
        assert_eq!(
            result.table.get(Symbol(0)).map(|entry| entry.text.as_str()),
            Some("(GT_TYPE == HET) in ANY(A, B)")
        );
        assert_eq!(
            expressions(&result)[0],
            SubExpression::Scoped {
                condition: "GT_TYPE == HET".into(),
                kind: ScopeKind::Any,
                samples: vec!["A".into(), "B".into()],
            }
        );

        Ok(())
    }

    #[test]
    fn symbolize_nested_scope_keeps_outermost() -> Result<(), anyhow::Error> {
        let result =
            symbolize("((DP > 5 AND (GT == 1/1) in ALL(s1)) OR AF < 0.1) in ONLY(s1,s2)")?;
        assert_eq!(result.symbolized, " A ");
        assert_eq!(
            expressions(&result),
            vec![SubExpression::Scoped {
                condition: "(DP > 5 AND (GT == 1/1) in ALL(s1)) OR AF < 0.1".into(),
                kind: ScopeKind::Only,
                samples: vec!["s1".into(), "s2".into()],
            }]
        );

        Ok(())
    }

    #[test]
    fn symbolize_set_and_gene() -> Result<(), anyhow::Error> {
        let result = symbolize("IN_SET(abc) OR NOT_IN_SET( def ) AND GENE(lacZ)")?;
        assert_eq!(result.symbolized, " A  OR  B  AND  C ");
        assert_eq!(
            expressions(&result),
            vec![
                SubExpression::SetMembership {
                    set_uid: "abc".into(),
                    negated: false
                },
                SubExpression::SetMembership {
                    set_uid: "def".into(),
                    negated: true
                },
                SubExpression::GeneRegion {
                    label: "lacZ".into()
                },
            ]
        );

        Ok(())
    }

    #[rstest::rstest]
    #[case::unknown_scope("(DP > 5) in SOME(s1)", ParseErrorKind::UnknownScope)]
    #[case::empty_scope("(DP > 5) in ALL( , )", ParseErrorKind::EmptyScope)]
    #[case::unclosed_samples("(DP > 5) in ALL(s1", ParseErrorKind::UnbalancedParentheses)]
    #[case::unopened_condition("DP > 5) in ALL(s1)", ParseErrorKind::UnbalancedParentheses)]
    #[case::empty_set("IN_SET()", ParseErrorKind::EmptySet)]
    #[case::empty_gene("GENE( )", ParseErrorKind::EmptyGene)]
    fn symbolize_errors(#[case] raw: &str, #[case] kind: ParseErrorKind) {
        assert_eq!(symbolize(raw).unwrap_err().kind, kind);
    }

    #[test]
    fn symbolize_exhausts_alphabet() {
        let ok = (0..52)
            .map(|i| format!("DP > {}", i))
            .collect::<Vec<_>>()
            .join(" OR ");
        assert_eq!(symbolize(&ok).unwrap().table.len(), 52);

        let too_many = format!("{} OR DP > 52", ok);
        assert_eq!(
            symbolize(&too_many).unwrap_err(),
            ParseError::new("DP > 52", ParseErrorKind::SymbolsExhausted(52))
        );
    }
}
