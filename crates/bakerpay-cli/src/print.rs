// Terminal tables for payout recipes, reports, and batch results.

use colored::*;

use bakerpay_core::execute::BatchResult;
use bakerpay_core::recipe::{only_invalid, only_valid, PayoutRecipe};
use bakerpay_core::report::PayoutReport;
use bakerpay_core::{bps_to_percentage_string, mutez_to_tez_string, Mutez};

fn render_table(header: &str, columns: &[&str], rows: Vec<Vec<String>>) {
    if rows.is_empty() {
        return;
    }
    let mut widths: Vec<usize> = columns.iter().map(|c| c.len()).collect();
    for row in &rows {
        for (i, cell) in row.iter().enumerate() {
            if cell.len() > widths[i] {
                widths[i] = cell.len();
            }
        }
    }
    println!();
    println!("{}", header.bold());
    let line: Vec<String> = columns
        .iter()
        .enumerate()
        .map(|(i, c)| format!("{:<width$}", c, width = widths[i]))
        .collect();
    println!("{}", line.join("  ").dimmed());
    for row in rows {
        let line: Vec<String> = row
            .iter()
            .enumerate()
            .map(|(i, cell)| format!("{:<width$}", cell, width = widths[i]))
            .collect();
        println!("{}", line.join("  "));
    }
}

fn recipe_row(recipe: &PayoutRecipe) -> Vec<String> {
    vec![
        recipe.delegator.shortened(),
        recipe.recipient.shortened(),
        mutez_to_tez_string(recipe.delegated_balance),
        recipe.kind.to_string(),
        mutez_to_tez_string(recipe.amount),
        bps_to_percentage_string(recipe.fee_rate_bps),
        mutez_to_tez_string(recipe.fee),
        mutez_to_tez_string(recipe.transaction_fee()),
        if recipe.note.is_empty() {
            "-".to_string()
        } else {
            recipe.note.clone()
        },
    ]
}

const RECIPE_COLUMNS: &[&str] = &[
    "Delegator",
    "Recipient",
    "Delegated Balance",
    "Kind",
    "Amount",
    "Fee Rate",
    "Baker Fee",
    "Transaction Fee",
    "Note",
];

pub fn print_invalid_payout_recipes(payouts: &[PayoutRecipe], cycle: i64) {
    let rows: Vec<Vec<String>> = only_invalid(payouts).iter().map(recipe_row).collect();
    render_table(&format!("Invalid - #{}", cycle), RECIPE_COLUMNS, rows);
}

pub fn print_valid_payout_recipes(payouts: &[PayoutRecipe], cycle: i64) {
    let valid = only_valid(payouts);
    let mut rows: Vec<Vec<String>> = valid.iter().map(recipe_row).collect();
    if !rows.is_empty() {
        let amount: Mutez = valid.iter().map(|p| p.amount).sum();
        let fee: Mutez = valid.iter().map(|p| p.fee).sum();
        let tx_fee: Mutez = valid.iter().map(|p| p.transaction_fee()).sum();
        rows.push(vec![
            "Total".to_string(),
            String::new(),
            String::new(),
            String::new(),
            mutez_to_tez_string(amount),
            "-".to_string(),
            mutez_to_tez_string(fee),
            mutez_to_tez_string(tx_fee),
            String::new(),
        ]);
    }
    render_table(&format!("Valid - #{}", cycle), RECIPE_COLUMNS, rows);
}

pub fn print_reports(reports: &[PayoutReport], header: &str) {
    let rows: Vec<Vec<String>> = reports.iter().map(|r| r.to_table_row()).collect();
    render_table(
        header,
        &[
            "Delegator",
            "Recipient",
            "Kind",
            "Amount",
            "Baker Fee",
            "Transaction Fee",
            "Op Hash",
        ],
        rows,
    );
}

pub fn print_batch_results(results: &[BatchResult], header: &str, explorer_url: &str) {
    let rows: Vec<Vec<String>> = results
        .iter()
        .enumerate()
        .map(|(i, result)| {
            let reference = if result.op_hash.is_empty() {
                "-".to_string()
            } else if explorer_url.is_empty() {
                result.op_hash.clone()
            } else {
                format!("{}/{}", explorer_url.trim_end_matches('/'), result.op_hash)
            };
            vec![
                format!("{}", i + 1),
                format!("{}", result.batch.len()),
                if result.is_success() {
                    "ok".green().to_string()
                } else {
                    "failed".red().to_string()
                },
                result.error_message.clone(),
                reference,
            ]
        })
        .collect();
    render_table(
        header,
        &["Batch", "Transactions", "Status", "Error", "Reference"],
        rows,
    );
}
