//! Parse a symbolized filter string and bring it into disjunctive normal form.

use std::collections::BTreeSet;

use pest::{error::InputLocation, iterators::Pair, Parser};

use crate::err::{ParseError, ParseErrorKind};

use super::symbols::{Symbol, SymbolTable};

/// Propositional formula over symbols.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Formula {
    Atom(Symbol),
    Not(Box<Formula>),
    And(Vec<Formula>),
    Or(Vec<Formula>),
}

impl std::fmt::Display for Formula {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Formula::Atom(symbol) => write!(f, "{}", symbol),
            Formula::Not(inner) => write!(f, "NOT {}", inner),
            Formula::And(children) => write!(f, "({})", itertools::join(children, " AND ")),
            Formula::Or(children) => write!(f, "({})", itertools::join(children, " OR ")),
        }
    }
}

/// A symbol or its negation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize)]
pub struct SignedSymbol {
    pub symbol: Symbol,
    pub negated: bool,
}

impl std::fmt::Display for SignedSymbol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.negated {
            write!(f, "~{}", self.symbol)
        } else {
            write!(f, "{}", self.symbol)
        }
    }
}

/// Conjunction of signed symbols; the empty conjunction is always true.
pub type Conjunction = BTreeSet<SignedSymbol>;

/// Disjunction of conjunctions.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct Dnf {
    /// The conjunctions, in canonical order and free of duplicates.
    pub conjunctions: Vec<Conjunction>,
}

impl Dnf {
    /// The formula that is always true: one empty conjunction.
    pub fn tautology() -> Self {
        Self {
            conjunctions: vec![Conjunction::new()],
        }
    }
}

impl std::fmt::Display for Dnf {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let conjunctions = self
            .conjunctions
            .iter()
            .map(|conjunction| {
                if conjunction.is_empty() {
                    String::from("true")
                } else {
                    itertools::join(conjunction.iter(), " & ")
                }
            })
            .collect::<Vec<_>>();
        write!(f, "{}", conjunctions.join(" | "))
    }
}

/// Parse `symbolized` and convert it to DNF.
///
/// An empty or whitespace-only string yields `Dnf::tautology()`.
///
/// # Errors
///
/// Returns a `ParseError` on syntax errors, on symbols missing from `table`,
/// if parentheses and negations nest deeper than `max_depth`, or if the DNF
/// has more than `max_conjunctions` conjunctions.
pub fn normalize(
    symbolized: &str,
    table: &SymbolTable,
    max_depth: usize,
    max_conjunctions: usize,
) -> Result<Dnf, ParseError> {
    check_nesting(symbolized, max_depth)?;
    match parse_formula(symbolized, table)? {
        Some(formula) => to_dnf(&formula, max_conjunctions),
        None => Ok(Dnf::tautology()),
    }
}

/// Convert `formula` to DNF.
pub fn to_dnf(formula: &Formula, max_conjunctions: usize) -> Result<Dnf, ParseError> {
    let conjunctions = distribute(formula, false, max_conjunctions)?
        .into_iter()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    Ok(Dnf { conjunctions })
}

/// Return the conjunctions of `formula`, negated if `negated` is set.
///
/// Negation is pushed down to the atoms on the way (De Morgan, double
/// negation elimination), AND is distributed over OR.
fn distribute(
    formula: &Formula,
    negated: bool,
    max_conjunctions: usize,
) -> Result<Vec<Conjunction>, ParseError> {
    let too_many = || {
        ParseError::new(
            formula.to_string(),
            ParseErrorKind::TooManyConjunctions(max_conjunctions),
        )
    };
    match (formula, negated) {
        (Formula::Atom(symbol), _) => Ok(vec![Conjunction::from([SignedSymbol {
            symbol: *symbol,
            negated,
        }])]),
        (Formula::Not(inner), _) => distribute(inner, !negated, max_conjunctions),
        (Formula::Or(children), false) | (Formula::And(children), true) => {
            let mut result = Vec::new();
            for child in children {
                result.extend(distribute(child, negated, max_conjunctions)?);
                if result.len() > max_conjunctions {
                    return Err(too_many());
                }
            }
            Ok(result)
        }
        (Formula::And(children), false) | (Formula::Or(children), true) => {
            let mut result = vec![Conjunction::new()];
            for child in children {
                let child_conjunctions = distribute(child, negated, max_conjunctions)?;
                if result.len().saturating_mul(child_conjunctions.len()) > max_conjunctions {
                    return Err(too_many());
                }
                result = result
                    .iter()
                    .flat_map(|lhs| {
                        child_conjunctions
                            .iter()
                            .map(move |rhs| lhs.union(rhs).copied().collect::<Conjunction>())
                    })
                    .collect();
            }
            Ok(result)
        }
    }
}

#[derive(pest_derive::Parser)]
#[grammar = "filter/formula.pest"]
struct FormulaParser;

/// Length of the offending fragment reported for too deep nesting.
const FRAGMENT_LEN: usize = 40;

/// Reject unbalanced parentheses and nesting deeper than `max_depth`.
///
/// Each opening parenthesis and each `NOT` adds one level on top of the
/// level it appears in.  This bounds the recursion of the parser and of the
/// DNF conversion.
fn check_nesting(symbolized: &str, max_depth: usize) -> Result<(), ParseError> {
    let too_deep = |idx: usize| {
        ParseError::new(
            symbolized[idx..].chars().take(FRAGMENT_LEN).collect::<String>(),
            ParseErrorKind::FormulaTooDeep(max_depth),
        )
    };

    // Depth at each open parenthesis and negations pending at the current one.
    let mut levels: Vec<usize> = Vec::new();
    let mut negations = 0usize;
    let mut chars = symbolized.char_indices().peekable();
    while let Some((idx, c)) = chars.next() {
        let level = levels.last().copied().unwrap_or(0);
        if c == '(' {
            let depth = level + negations + 1;
            if depth > max_depth {
                return Err(too_deep(idx));
            }
            levels.push(depth);
            negations = 0;
        } else if c == ')' {
            if levels.pop().is_none() {
                return Err(ParseError::new(")", ParseErrorKind::UnbalancedParentheses));
            }
            negations = 0;
        } else if c.is_ascii_alphanumeric() || c == '_' {
            let mut end = idx + c.len_utf8();
            while let Some(&(next_idx, next)) = chars.peek() {
                if next.is_ascii_alphanumeric() || next == '_' {
                    end = next_idx + next.len_utf8();
                    chars.next();
                } else {
                    break;
                }
            }
            if symbolized[idx..end].eq_ignore_ascii_case("not") {
                negations += 1;
                if level + negations > max_depth {
                    return Err(too_deep(idx));
                }
            } else {
                negations = 0;
            }
        }
    }

    if levels.is_empty() {
        Ok(())
    } else {
        Err(ParseError::new("(", ParseErrorKind::UnbalancedParentheses))
    }
}

/// Parse `symbolized` into a `Formula`, `None` if it is blank.
fn parse_formula(symbolized: &str, table: &SymbolTable) -> Result<Option<Formula>, ParseError> {
    let mut pairs = FormulaParser::parse(Rule::formula, symbolized)
        .map_err(|e| syntax_error(symbolized, &e))?;
    let Some(formula) = pairs.next() else {
        return Ok(None);
    };
    formula
        .into_inner()
        .find(|pair| pair.as_rule() == Rule::disjunction)
        .map(|pair| build_formula(pair, table))
        .transpose()
}

/// Map a pest error to the word of `symbolized` it points at.
fn syntax_error(symbolized: &str, error: &pest::error::Error<Rule>) -> ParseError {
    let pos = match error.location {
        InputLocation::Pos(pos) => pos,
        InputLocation::Span((start, _)) => start,
    };
    match symbolized
        .get(pos..)
        .and_then(|rest| rest.split_whitespace().next())
    {
        Some(word) => ParseError::new(word, ParseErrorKind::UnexpectedToken),
        None => ParseError::new("", ParseErrorKind::UnexpectedEnd),
    }
}

fn build_formula(pair: Pair<Rule>, table: &SymbolTable) -> Result<Formula, ParseError> {
    match pair.as_rule() {
        Rule::disjunction => build_children(pair, Rule::conjunction, table, Formula::Or),
        Rule::conjunction => build_children(pair, Rule::negation, table, Formula::And),
        Rule::negation => {
            let mut negations = 0;
            let mut operand = None;
            for inner in pair.into_inner() {
                if inner.as_rule() == Rule::not_op {
                    negations += 1;
                } else {
                    operand = Some(build_formula(inner, table)?);
                }
            }
            let operand =
                operand.ok_or_else(|| ParseError::new("", ParseErrorKind::UnexpectedEnd))?;
            Ok((0..negations).fold(operand, |formula, _| Formula::Not(Box::new(formula))))
        }
        Rule::symbol => {
            let text = pair.as_str();
            text.chars()
                .next()
                .and_then(Symbol::from_char)
                .filter(|symbol| table.get(*symbol).is_some())
                .map(Formula::Atom)
                .ok_or_else(|| ParseError::new(text, ParseErrorKind::UnexpectedToken))
        }
        _ => Err(ParseError::new(
            pair.as_str(),
            ParseErrorKind::UnexpectedToken,
        )),
    }
}

/// Build the `child_rule` children of `pair`, combined with `combine` if
/// there is more than one.
fn build_children(
    pair: Pair<Rule>,
    child_rule: Rule,
    table: &SymbolTable,
    combine: fn(Vec<Formula>) -> Formula,
) -> Result<Formula, ParseError> {
    let mut children = pair
        .into_inner()
        .filter(|inner| inner.as_rule() == child_rule)
        .map(|inner| build_formula(inner, table))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(if children.len() == 1 {
        children.remove(0)
    } else {
        combine(children)
    })
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::filter::symbols::symbolize;

    fn dnf_of(raw: &str) -> Result<Dnf, ParseError> {
        let symbolized = symbolize(raw)?;
        normalize(&symbolized.symbolized, &symbolized.table, 64, 1024)
    }

    #[test]
    fn empty_is_tautology() -> Result<(), anyhow::Error> {
        assert_eq!(dnf_of("")?, Dnf::tautology());
        assert_eq!(dnf_of("   ")?, Dnf::tautology());
        insta::assert_snapshot!(dnf_of("")?, @"true");

        Ok(())
    }

    #[test]
    fn single_atom() -> Result<(), anyhow::Error> {
        insta::assert_snapshot!(dnf_of("DP > 1")?, @"A");
        insta::assert_snapshot!(dnf_of("((DP > 1))")?, @"A");

        Ok(())
    }

    #[test]
    fn distribution() -> Result<(), anyhow::Error> {
        insta::assert_snapshot!(dnf_of("DP > 1 AND (AF < 0.1 OR QUAL > 30)")?, @"A & B | A & C");
        insta::assert_snapshot!(
            dnf_of("(DP > 1 OR AF < 0.1) and (QUAL > 30 or GQ > 5)")?,
            @"A & C | A & D | B & C | B & D"
        );

        Ok(())
    }

    #[test]
    fn precedence() -> Result<(), anyhow::Error> {
        insta::assert_snapshot!(dnf_of("DP > 1 OR AF < 0.1 AND QUAL > 30")?, @"A | B & C");
        insta::assert_snapshot!(dnf_of("NOT DP > 1 AND AF < 0.1")?, @"~A & B");

        Ok(())
    }

    #[test]
    fn de_morgan_and_double_negation() -> Result<(), anyhow::Error> {
        insta::assert_snapshot!(dnf_of("NOT (DP > 1 AND AF < 0.1)")?, @"~A | ~B");
        insta::assert_snapshot!(dnf_of("NOT (DP > 1 OR AF < 0.1)")?, @"~A & ~B");
        insta::assert_snapshot!(dnf_of("NOT NOT DP > 1")?, @"A");

        Ok(())
    }

    #[test]
    fn duplicates_collapse() -> Result<(), anyhow::Error> {
        let symbolized = symbolize("DP > 1 OR AF < 0.1")?;
        let a = Formula::Atom(Symbol::from_char('A').unwrap());
        let b = Formula::Atom(Symbol::from_char('B').unwrap());
        let formula = Formula::Or(vec![
            Formula::And(vec![a.clone(), b.clone()]),
            Formula::And(vec![b.clone(), a.clone()]),
            Formula::And(vec![a.clone(), a.clone()]),
        ]);
        let dnf = to_dnf(&formula, 16)?;
        assert_eq!(dnf.to_string(), "A | A & B");
        assert_eq!(symbolized.table.len(), 2);

        Ok(())
    }

    /// Render the DNF of `raw` with sub-expression texts instead of symbols.
    fn dnf_texts(raw: &str) -> Result<BTreeSet<BTreeSet<(String, bool)>>, ParseError> {
        let symbolized = symbolize(raw)?;
        let dnf = normalize(&symbolized.symbolized, &symbolized.table, 64, 1024)?;
        Ok(dnf
            .conjunctions
            .iter()
            .map(|conjunction| {
                conjunction
                    .iter()
                    .filter_map(|signed| {
                        symbolized
                            .table
                            .get(signed.symbol)
                            .map(|entry| (entry.text.clone(), signed.negated))
                    })
                    .collect()
            })
            .collect())
    }

    #[test]
    fn equivalent_trees_normalize_identically() -> Result<(), anyhow::Error> {
        assert_eq!(
            dnf_texts("DP > 1 AND (AF < 0.1 OR QUAL > 30)")?,
            dnf_texts("(DP > 1 AND AF < 0.1) OR (QUAL > 30 AND DP > 1)")?
        );
        assert_eq!(
            dnf_texts("NOT (DP > 1 OR NOT AF < 0.1)")?,
            dnf_texts("AF < 0.1 AND NOT DP > 1")?
        );

        Ok(())
    }

    #[test]
    fn too_many_conjunctions() {
        let raw = (0..6)
            .map(|i| format!("(DP > {} OR AF < {})", i, i))
            .collect::<Vec<_>>()
            .join(" AND ");
        let symbolized = symbolize(&raw).unwrap();
        let err = normalize(&symbolized.symbolized, &symbolized.table, 64, 32).unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::TooManyConjunctions(32));
        assert!(normalize(&symbolized.symbolized, &symbolized.table, 64, 64).is_ok());
    }

    #[test]
    fn keywords_are_case_insensitive() -> Result<(), anyhow::Error> {
        insta::assert_snapshot!(dnf_of("not DP > 1 Or AF < 0.1 aNd QUAL > 30")?, @"~A | B & C");

        Ok(())
    }

    #[test]
    fn nesting_within_limit() -> Result<(), anyhow::Error> {
        let raw = format!("{}DP > 1{}", "(".repeat(64), ")".repeat(64));
        insta::assert_snapshot!(dnf_of(&raw)?, @"A");
        let raw = format!("{}DP > 1", "NOT ".repeat(64));
        insta::assert_snapshot!(dnf_of(&raw)?, @"A");

        Ok(())
    }

    #[rstest::rstest]
    #[case::parentheses(format!("{}DP > 1{}", "(".repeat(100_000), ")".repeat(100_000)))]
    #[case::negations(format!("{}DP > 1", "NOT ".repeat(100_000)))]
    #[case::mixed(format!("{}DP > 1{}", "NOT (".repeat(33), ")".repeat(33)))]
    fn nesting_too_deep(#[case] raw: String) {
        let err = dnf_of(&raw).unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::FormulaTooDeep(64));
        assert!(err.fragment.len() <= FRAGMENT_LEN);
    }

    #[rstest::rstest]
    #[case::dangling_and("DP > 1 AND", ParseErrorKind::UnexpectedEnd)]
    #[case::missing_close("(DP > 1", ParseErrorKind::UnbalancedParentheses)]
    #[case::extra_close("DP > 1)", ParseErrorKind::UnbalancedParentheses)]
    #[case::junk_word("DP > 1 XOR AF < 0.1", ParseErrorKind::UnexpectedToken)]
    #[case::unknown_symbol("DP > 1 AND Q", ParseErrorKind::UnexpectedToken)]
    #[case::adjacent_atoms("DP > 1 AF < 0.1", ParseErrorKind::UnexpectedToken)]
    #[case::stray_operator("DP > 1 && AF < 0.1", ParseErrorKind::UnexpectedToken)]
    fn parse_errors(#[case] raw: &str, #[case] kind: ParseErrorKind) {
        assert_eq!(dnf_of(raw).unwrap_err().kind, kind);
    }
}
