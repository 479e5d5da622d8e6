//! Deterministic local answer generator.
//!
//! When the remote inference endpoint is unreachable, fails, or returns an
//! empty answer, the turn orchestrator falls back to this generator. It is
//! pure and total: no I/O, never panics, and never produces empty content,
//! so a failed turn still settles into a readable answer.
//!
//! Three layers, assembled in order:
//!
//! 1. **Opener** — one sentence picked by lexical sentiment classification
//!    of the question (fast keyword scan, ties and no-matches are neutral).
//! 2. **Insights** — up to three best-effort bullets derived from the
//!    business snapshot; any heuristic that has nothing to say is skipped.
//! 3. **Closing** — revenue/expense/net aggregates with the net amount
//!    styled by sign.

use crate::context::BusinessSnapshot;

/// A locally generated answer.
#[derive(Debug, Clone, PartialEq)]
pub struct FallbackAnswer {
    /// Rich-text markup, never empty.
    pub content: String,
    /// Suggested next questions for the answer's category, at most
    /// [`MAX_FOLLOW_UPS`].
    pub follow_ups: Vec<String>,
}

/// Maximum number of follow-up suggestions attached to an answer.
pub const MAX_FOLLOW_UPS: usize = 3;

// ── Sentiment tables ────────────────────────────────────────────────────

const POSITIVE_WORDS: &[&str] = &[
    "good",
    "great",
    "up",
    "increase",
    "profit",
    "growth",
    "improve",
    "best",
    "success",
    "strong",
    "gain",
    "well",
    "winning",
    "healthy",
];

const NEGATIVE_WORDS: &[&str] = &[
    "bad",
    "down",
    "loss",
    "decrease",
    "drop",
    "problem",
    "worst",
    "fail",
    "weak",
    "decline",
    "concern",
    "issue",
    "struggling",
    "worried",
];

/// Lexical sentiment classification of a question.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum QuestionTone {
    Positive,
    Negative,
    Neutral,
}

/// Classify a question by counting keyword hits from the fixed word tables.
///
/// Ties and zero hits classify as neutral.
fn classify_question(question: &str) -> QuestionTone {
    let lower = question.to_lowercase();
    let positive = POSITIVE_WORDS.iter().filter(|w| lower.contains(*w)).count();
    let negative = NEGATIVE_WORDS.iter().filter(|w| lower.contains(*w)).count();

    if positive > negative {
        QuestionTone::Positive
    } else if negative > positive {
        QuestionTone::Negative
    } else {
        QuestionTone::Neutral
    }
}

fn opener(tone: QuestionTone) -> &'static str {
    match tone {
        QuestionTone::Positive => {
            "Things are looking encouraging. Here is a quick read of the numbers."
        }
        QuestionTone::Negative => {
            "I hear the concern. Let us look at what the numbers actually say."
        }
        QuestionTone::Neutral => "Here is a summary of how the business is doing right now.",
    }
}

// ── Follow-up suggestion tables ─────────────────────────────────────────

const SALES_FOLLOW_UPS: &[&str] = &[
    "Which product sold best this month?",
    "How does revenue compare to last month?",
    "Who are my top customers?",
];

const EXPENSES_FOLLOW_UPS: &[&str] = &[
    "What is my biggest expense category?",
    "How can I reduce operating costs?",
    "Show me expenses over time.",
];

const INVENTORY_FOLLOW_UPS: &[&str] = &[
    "Which products are low on stock?",
    "What is my inventory worth?",
    "Which products have the best margin?",
];

const CUSTOMERS_FOLLOW_UPS: &[&str] = &[
    "Who are my most valuable customers?",
    "How many new customers did we gain?",
    "Which customers have gone quiet?",
];

const GENERAL_FOLLOW_UPS: &[&str] = &[
    "How are sales trending?",
    "What are my biggest expenses?",
    "Is my inventory healthy?",
];

/// Suggested next questions for a category, truncated to [`MAX_FOLLOW_UPS`].
///
/// Unrecognized categories get the generic list.
#[must_use]
pub fn follow_ups_for(category: &str) -> Vec<String> {
    let table = match category {
        "sales" => SALES_FOLLOW_UPS,
        "expenses" => EXPENSES_FOLLOW_UPS,
        "inventory" => INVENTORY_FOLLOW_UPS,
        "customers" => CUSTOMERS_FOLLOW_UPS,
        _ => GENERAL_FOLLOW_UPS,
    };
    table
        .iter()
        .take(MAX_FOLLOW_UPS)
        .map(|s| (*s).to_owned())
        .collect()
}

// ── Generation ──────────────────────────────────────────────────────────

/// Generate a guaranteed non-empty answer for a question.
///
/// Pure: the same inputs always produce the same answer.
#[must_use]
pub fn generate(question: &str, snapshot: &BusinessSnapshot, category: &str) -> FallbackAnswer {
    let tone = classify_question(question);

    let mut content = String::new();
    content.push_str("<p>");
    content.push_str(opener(tone));
    content.push_str("</p>");

    let bullets = insights(snapshot);
    if !bullets.is_empty() {
        content.push_str("<ul>");
        for bullet in &bullets {
            content.push_str("<li>");
            content.push_str(bullet);
            content.push_str("</li>");
        }
        content.push_str("</ul>");
    }

    content.push_str(&closing_line(snapshot));

    FallbackAnswer {
        content,
        follow_ups: follow_ups_for(category),
    }
}

/// Render the aggregate closing line with a sign-styled net amount.
///
/// Zero is styled non-negative.
fn closing_line(snapshot: &BusinessSnapshot) -> String {
    let revenue = snapshot.total_revenue();
    let expenses = snapshot.total_expenses();
    let net = snapshot.net();
    let class = if net < 0.0 {
        "amount-negative"
    } else {
        "amount-positive"
    };
    format!(
        "<p>Revenue stands at {}, expenses at {}, for a net of \
         <strong class=\"{class}\">{}</strong>.</p>",
        format_amount(revenue, &snapshot.currency),
        format_amount(expenses, &snapshot.currency),
        format_amount(net, &snapshot.currency),
    )
}

/// Minimal amount rendering. Full locale-aware formatting belongs to the
/// host application; the generator only needs something readable.
fn format_amount(value: f64, currency: &str) -> String {
    if currency.is_empty() {
        format!("{value:.2}")
    } else {
        format!("{currency} {value:.2}")
    }
}

// ── Insight heuristics ──────────────────────────────────────────────────

/// Up to three best-effort insight bullets. Each heuristic returns `None`
/// when it has nothing defensible to say; a missing insight never fails or
/// degrades the answer.
fn insights(snapshot: &BusinessSnapshot) -> Vec<String> {
    [
        low_stock_insight(snapshot),
        top_customer_insight(snapshot),
        margin_insight(snapshot),
    ]
    .into_iter()
    .flatten()
    .take(3)
    .collect()
}

fn low_stock_insight(snapshot: &BusinessSnapshot) -> Option<String> {
    if snapshot.products.is_empty() {
        return None;
    }
    let low = snapshot
        .products
        .iter()
        .filter(|p| p.stock <= p.reorder_level)
        .count();
    if low == 0 {
        return None;
    }
    let plural = if low == 1 { "product is" } else { "products are" };
    Some(format!("{low} {plural} at or below the reorder level."))
}

fn top_customer_insight(snapshot: &BusinessSnapshot) -> Option<String> {
    let mut totals: Vec<(&str, f64)> = Vec::new();
    for sale in &snapshot.sales {
        if sale.customer.trim().is_empty() {
            continue;
        }
        match totals.iter().position(|(name, _)| *name == sale.customer) {
            Some(index) => totals[index].1 += sale.total,
            None => totals.push((sale.customer.as_str(), sale.total)),
        }
    }
    let (name, total) = totals
        .into_iter()
        .max_by(|a, b| a.1.total_cmp(&b.1))
        .filter(|(_, total)| *total > 0.0)?;
    Some(format!(
        "Your top customer is {name} at {}.",
        format_amount(total, &snapshot.currency)
    ))
}

fn margin_insight(snapshot: &BusinessSnapshot) -> Option<String> {
    let margins: Vec<f64> = snapshot
        .products
        .iter()
        .filter(|p| p.price > 0.0)
        .map(|p| (p.price - p.cost) / p.price)
        .collect();
    if margins.is_empty() {
        return None;
    }
    let average = margins.iter().sum::<f64>() / margins.len() as f64;
    Some(format!(
        "Average product margin is {:.0}%.",
        average * 100.0
    ))
}
