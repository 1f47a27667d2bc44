// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// BAKERPAY - CORE MODULE
//
// Payout pipeline for a block-producing baker: candidate generation,
// batch assembly + simulation, execution/confirmation, reports, cycle
// monitor. All financial arithmetic uses u128 mutez units (no
// floating-point).
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub mod address;
pub mod batch;
pub mod candidate;
pub mod config;
pub mod engines;
pub mod enums;
pub mod error;
pub mod execute;
pub mod generate;
pub mod monitor;
pub mod ops;
pub mod prepare;
pub mod protected;
pub mod recipe;
pub mod report;
pub mod reports_store;

/// Smallest indivisible unit of the native token.
pub type Mutez = u128;

/// 1 tez = 1_000_000 mutez
pub const MUTEZ_PER_TEZ: u128 = 1_000_000;

/// Fee and donation rates are expressed in basis points (10_000 = 100%).
pub const RATE_DENOMINATOR: u32 = 10_000;

/// Hard per-operation gas cap enforced by the ledger.
pub const HARD_GAS_LIMIT_PER_OPERATION: u64 = 1_040_000;
/// Hard per-operation serialized size cap (bytes).
pub const MAX_OPERATION_SIZE: u64 = 32_768;

/// Buffer added on top of simulated gas per transaction.
pub const DEFAULT_TX_GAS_LIMIT_BUFFER: u64 = 100;
/// Buffer for deserialization gas accounted per transaction.
pub const DEFAULT_TX_DESERIALIZATION_GAS_BUFFER: u64 = 5;
/// Buffer added on top of the simulated transaction fee (mutez).
pub const DEFAULT_TX_FEE_BUFFER: u128 = 10;
/// Fee buffer for transactions targeting smart contracts (mutez).
pub const DEFAULT_KT_TX_FEE_BUFFER: u128 = 200;

/// Operator-tuned per-recipient fee reserve used by the balance check
/// (mutez). Not derived; see the configuration reference.
pub const PAYOUT_FEE_BUFFER: u128 = 1_000;

/// Confirmations awaited per dispatched operation.
pub const DEFAULT_REQUIRED_CONFIRMATIONS: u64 = 2;
/// Default operation TTL in blocks.
pub const DEFAULT_OPERATION_TTL: u64 = 12;
/// Branch is taken this many blocks behind head at dispatch time.
pub const BRANCH_OFFSET: i64 = 2;

/// Default baker fee: 5% in basis points.
pub const DEFAULT_BAKER_FEE_BPS: u32 = 500;
/// Default minimum payout amount (mutez).
pub const DEFAULT_PAYOUT_MINIMUM_AMOUNT: u128 = 10_000;

/// Sleep between insufficient-balance re-checks.
pub const BALANCE_WAIT_INTERVAL_SECS: u64 = 300;
/// Admin is notified every this many insufficient-balance iterations (~hourly).
pub const BALANCE_NOTIFY_EVERY: u64 = 12;

/// Cycle monitor retry backoff cap.
pub const MONITOR_BACKOFF_CAP_SECS: u64 = 60;

/// `floor(amount * bps / 10_000)` — pure integer math.
pub fn bps_portion(amount: Mutez, bps: u32) -> Mutez {
    amount.saturating_mul(bps as u128) / RATE_DENOMINATOR as u128
}

/// `floor(amount * numerator / denominator)` in u128.
/// On product overflow, splits the numerator to keep the result exact
/// enough instead of silently returning 0.
pub fn proportion(amount: Mutez, numerator: u128, denominator: u128) -> Mutez {
    if denominator == 0 {
        return 0;
    }
    match amount.checked_mul(numerator) {
        Some(product) => product / denominator,
        None => {
            let quotient = numerator / denominator;
            let remainder = numerator % denominator;
            amount.saturating_mul(quotient)
                + match amount.checked_mul(remainder) {
                    Some(v) => v / denominator,
                    None => (amount / denominator).saturating_mul(remainder),
                }
        }
    }
}

/// Convert a decimal rate from the config surface (e.g. 0.05) to basis
/// points, clamped to [0, 10_000].
pub fn rate_to_bps(rate: f64) -> u32 {
    if !rate.is_finite() || rate <= 0.0 {
        return 0;
    }
    let bps = (rate * RATE_DENOMINATOR as f64).round();
    if bps >= RATE_DENOMINATOR as f64 {
        RATE_DENOMINATOR
    } else {
        bps as u32
    }
}

/// Convert a tez amount from the config surface to mutez (floor).
pub fn tez_to_mutez(tez: f64) -> Mutez {
    if !tez.is_finite() || tez <= 0.0 {
        return 0;
    }
    (tez * MUTEZ_PER_TEZ as f64).floor() as u128
}

/// Render mutez as a "1.234567 tez" string for tables and logs.
pub fn mutez_to_tez_string(amount: Mutez) -> String {
    format!(
        "{}.{:06} tez",
        amount / MUTEZ_PER_TEZ,
        amount % MUTEZ_PER_TEZ
    )
}

/// Render a basis-point rate as a percentage string ("-" for zero).
pub fn bps_to_percentage_string(bps: u32) -> String {
    if bps == 0 {
        return "-".to_string();
    }
    format!("{}.{:02} %", bps / 100, bps % 100)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bps_portion() {
        assert_eq!(bps_portion(2000, 1005), 201);
        assert_eq!(bps_portion(2000, 10_000), 2000);
        assert_eq!(bps_portion(2000, 1000), 200);
        assert_eq!(bps_portion(2000, 100), 20);
        assert_eq!(bps_portion(0, 500), 0);
        // floor, not round
        assert_eq!(bps_portion(999, 500), 49);
    }

    #[test]
    fn test_proportion_exact() {
        // 100_000_000 * (1_000_000_000 / 1_000_000_000) = 100_000_000
        assert_eq!(proportion(100_000_000, 1_000_000_000, 1_000_000_000), 100_000_000);
        assert_eq!(proportion(100, 1, 3), 33);
        assert_eq!(proportion(100, 0, 3), 0);
        assert_eq!(proportion(100, 1, 0), 0);
    }

    #[test]
    fn test_proportion_overflow_fallback() {
        // amount * numerator overflows u128; fallback path must not return 0
        let amount = u128::MAX / 2;
        let result = proportion(amount, 4, 2);
        assert!(result > amount);
    }

    #[test]
    fn test_rate_to_bps() {
        assert_eq!(rate_to_bps(0.05), 500);
        assert_eq!(rate_to_bps(1.0), 10_000);
        assert_eq!(rate_to_bps(1.5), 10_000);
        assert_eq!(rate_to_bps(0.0), 0);
        assert_eq!(rate_to_bps(-0.1), 0);
        assert_eq!(rate_to_bps(0.1005), 1005);
    }

    #[test]
    fn test_mutez_formatting() {
        assert_eq!(mutez_to_tez_string(1_000_000), "1.000000 tez");
        assert_eq!(mutez_to_tez_string(95_000_000), "95.000000 tez");
        assert_eq!(mutez_to_tez_string(1_234_567), "1.234567 tez");
        assert_eq!(mutez_to_tez_string(42), "0.000042 tez");
    }

    #[test]
    fn test_tez_to_mutez() {
        assert_eq!(tez_to_mutez(0.25), 250_000);
        assert_eq!(tez_to_mutez(1.0), 1_000_000);
        assert_eq!(tez_to_mutez(0.0), 0);
    }
}
