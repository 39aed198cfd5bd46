// Colored terminal output for recommendation lists, similarity scores and
// batch job summaries. The main.rs command handlers delegate here.

use colored::Colorize;

use crate::dataset::ImportSummary;
use crate::db::models::{Channel, ChannelKind};
use crate::evaluate::EvaluationReport;
use crate::recommend::RecommendedChannel;
use crate::similarity::{RecalcSummary, SimilarityBreakdown};

/// Display a ranked recommendation list with its reasons.
pub fn display_recommendations(user_id: i64, start: usize, results: &[RecommendedChannel]) {
    if results.is_empty() {
        println!("No recommendations for user {user_id} yet.");
        println!(
            "{}",
            "Recommendations need ratings and a computed similarity table (`affinity calculate --full`)."
                .dimmed()
        );
        return;
    }

    println!(
        "\n{}",
        format!("=== Recommendations for user {user_id} ({} shown) ===", results.len()).bold()
    );
    println!();

    println!(
        "  {:>4}  {:<40} {:>7}  {:<5}  {:<4}",
        "Rank".dimmed(),
        "Channel".dimmed(),
        "Guess".dimmed(),
        "Kind".dimmed(),
        "Lang".dimmed(),
    );
    println!("  {}", "-".repeat(68).dimmed());

    for (i, rec) in results.iter().enumerate() {
        println!(
            "  {:>4}. {:<40} {:>7}  {:<5}  {:<4}",
            start + i + 1,
            channel_label(&rec.channel),
            colorize_guess(rec.guessed),
            kind_label(rec.channel.kind()),
            rec.channel.language.as_deref().unwrap_or("-"),
        );
        for reason in &rec.reasons {
            println!(
                "          {} {} ({:+.2})",
                "because you liked".dimmed(),
                super::truncate_chars(&reason.channel.name, 40),
                reason.score,
            );
        }
    }
    println!();
}

/// Display a pair's combined score and the signals behind it.
pub fn display_similarity(a: &Channel, b: &Channel, score: f64, parts: &SimilarityBreakdown) {
    println!(
        "\n{}",
        format!("=== Similarity: {} <-> {} ===", a.id, b.id).bold()
    );
    println!("  {}  {}", channel_label(a), channel_label(b).dimmed());
    println!("  Combined:      {}", colorize_similarity(score));
    println!("  Ratings:       {:+.3}", parts.rating);
    println!("  Language:      {:.3}", parts.language);
    println!("  Categories:    {:.3}", parts.category);
    match parts.subscription {
        Some(sub) => println!("  Subscriptions: {sub:.3}"),
        None => println!("  Subscriptions: {}", "not weighted".dimmed()),
    }
}

/// Display what a recalculation job did.
pub fn display_recalc_summary(label: &str, summary: &RecalcSummary, total_rows: i64) {
    println!("\n{}", format!("{label} complete.").bold());
    println!("  Channels scanned: {}", summary.channels_scanned);
    println!("  Pairs computed:   {}", summary.pairs_computed);
    println!("  Rows deleted:     {}", summary.rows_deleted);
    println!("  Rows in table:    {total_rows}");
}

pub fn display_import_summary(summary: &ImportSummary) {
    println!("\n{}", "Import complete.".bold());
    println!("  Channels:       {}", summary.channels);
    println!("  Ratings:        {}", summary.ratings);
    println!(
        "  Subscriptions:  {} ({} throttled)",
        summary.subscriptions, summary.subscriptions_throttled
    );
    println!("  Added channels: {}", summary.added_channels);
}

pub fn display_evaluation(report: &EvaluationReport) {
    println!("\n{}", "=== Hold-out evaluation ===".bold());
    println!("  Training users:     {}", report.training_users);
    println!("  Verification users: {}", report.verification_users);
    println!("  Pairs compared:     {}", report.pairs_compared);
    println!("  Predictions:        {}", report.predictions);
    match report.rmse {
        Some(rmse) => println!("  RMSE:               {}", format!("{rmse:.4}").bold()),
        None => println!(
            "  RMSE:               {}",
            "n/a (nothing could be predicted)".yellow()
        ),
    }
}

fn channel_label(channel: &Channel) -> String {
    super::truncate_chars(&format!("#{} {}", channel.id, channel.name), 37)
}

fn kind_label(kind: ChannelKind) -> &'static str {
    match kind {
        ChannelKind::Feed => "feed",
        ChannelKind::Site => "site",
    }
}

/// Colorize a predicted rating on the 1-5 scale.
fn colorize_guess(guess: f64) -> colored::ColoredString {
    let text = format!("{guess:.2}");
    if guess >= 4.5 {
        text.green().bold()
    } else if guess >= 4.0 {
        text.green()
    } else {
        text.normal()
    }
}

/// Colorize a similarity score in [-1, 1].
fn colorize_similarity(score: f64) -> colored::ColoredString {
    let text = format!("{score:+.3}");
    if score >= 0.5 {
        text.green().bold()
    } else if score > 0.0 {
        text.green()
    } else if score < 0.0 {
        text.red()
    } else {
        text.dimmed()
    }
}
