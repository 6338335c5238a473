//! Integer-exact profit accounting.
//!
//! All arithmetic mirrors the on-chain fee math. The flash-loan fee uses
//! ceiling division because the lending program rounds up; computing it any
//! other way produces transactions that revert on repay.

use solana_sdk::pubkey::Pubkey;

use crate::config::{LAMPORTS_PER_SOL, NATIVE_MINT};

/// Base signature fee in lamports.
pub const BASE_FEE_LAMPORTS: u64 = 5_000;

/// Fallback price when no leg bridges the native token: borrow-token raw
/// units per one whole SOL.
pub const STATIC_SOL_PRICE_TOKEN_UNITS: u128 = 140_000_000;

/// Gas-cost parameters for a single composed transaction.
#[derive(Debug, Clone, Copy)]
pub struct GasParams {
    pub priority_fee_micro: u64,
    pub compute_unit_limit: u32,
    pub tip_lamports: u64,
    pub use_tip: bool,
}

/// Full cost breakdown for one candidate cycle, in borrow-token raw units.
#[derive(Debug, Clone, Copy)]
pub struct ProfitBreakdown {
    pub borrow: u64,
    pub final_out: u64,
    pub flash_fee: u64,
    pub gas_lamports: u64,
    pub gas_in_token: u64,
    pub expected_profit: i128,
    pub profit_bps: i32,
}

#[inline]
pub fn ceil_div(numerator: u128, denominator: u128) -> u128 {
    (numerator + denominator - 1) / denominator
}

/// Flash-loan fee with the program's rounding: `ceil(borrow * fee_bps / 10_000)`.
pub fn flash_loan_fee(borrow: u64, fee_bps: u16) -> u64 {
    ceil_div(borrow as u128 * fee_bps as u128, 10_000) as u64
}

/// Total lamports consumed by the transaction: base fee, prioritization
/// (compute budget), and the optional tip.
pub fn gas_lamports(gas: &GasParams) -> u64 {
    let priority = ceil_div(
        gas.compute_unit_limit as u128 * gas.priority_fee_micro as u128,
        1_000_000,
    ) as u64;
    let tip = if gas.use_tip { gas.tip_lamports } else { 0 };
    BASE_FEE_LAMPORTS + priority + tip
}

/// Convert a lamport cost into borrow-token units using whichever leg
/// bridges SOL and the borrow token.
///
/// - borrow token is SOL: lamports are already borrow units;
/// - intermediate token is SOL: leg 1 bought `leg1_out` lamports for
///   `borrow` units, so the rate is `borrow / leg1_out`;
/// - neither: fall back to a conservative static SOL price.
pub fn gas_cost_in_token(
    gas_lamports: u64,
    borrow: u64,
    leg1_out: u64,
    token_a: Pubkey,
    token_b: Pubkey,
) -> u64 {
    if token_a == NATIVE_MINT {
        return gas_lamports;
    }
    if token_b == NATIVE_MINT && leg1_out > 0 {
        return (gas_lamports as u128 * borrow as u128 / leg1_out as u128) as u64;
    }
    (gas_lamports as u128 * STATIC_SOL_PRICE_TOKEN_UNITS / LAMPORTS_PER_SOL as u128) as u64
}

/// Expected profit of a cycle that borrows `borrow`, routes through leg 1
/// producing `leg1_out`, and finishes with `final_out` of the borrow token.
///
/// `final_out` is `leg2_out` for two-leg cycles and `leg3_out` for
/// triangular ones.
pub fn compute_profit(
    borrow: u64,
    leg1_out: u64,
    final_out: u64,
    fee_bps: u16,
    gas: &GasParams,
    token_a: Pubkey,
    token_b: Pubkey,
) -> ProfitBreakdown {
    let flash_fee = flash_loan_fee(borrow, fee_bps);
    let lamports = gas_lamports(gas);
    let gas_in_token = gas_cost_in_token(lamports, borrow, leg1_out, token_a, token_b);

    let expected_profit =
        final_out as i128 - borrow as i128 - flash_fee as i128 - gas_in_token as i128;
    let profit_bps = if borrow > 0 {
        (expected_profit * 10_000 / borrow as i128).clamp(i32::MIN as i128, i32::MAX as i128) as i32
    } else {
        0
    };

    ProfitBreakdown {
        borrow,
        final_out,
        flash_fee,
        gas_lamports: lamports,
        gas_in_token,
        expected_profit,
        profit_bps,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn flash_fee_exact_division() {
        // 1e9 * 9 / 10_000 divides exactly
        assert_eq!(flash_loan_fee(1_000_000_000, 9), 900_000);
    }

    #[test]
    fn flash_fee_rounds_up() {
        assert_eq!(flash_loan_fee(1_000_000_001, 9), 900_001);
    }

    #[test]
    fn gas_roll_up_includes_priority_fee() {
        let gas = GasParams {
            priority_fee_micro: 25_000,
            compute_unit_limit: 400_000,
            tip_lamports: 0,
            use_tip: false,
        };
        // 5000 base + ceil(400_000 * 25_000 / 1e6) = 5000 + 10_000
        assert_eq!(gas_lamports(&gas), 15_000);
    }

    #[test]
    fn tip_only_counts_when_enabled() {
        let mut gas = GasParams {
            priority_fee_micro: 0,
            compute_unit_limit: 0,
            tip_lamports: 100_000,
            use_tip: false,
        };
        assert_eq!(gas_lamports(&gas), BASE_FEE_LAMPORTS);
        gas.use_tip = true;
        assert_eq!(gas_lamports(&gas), BASE_FEE_LAMPORTS + 100_000);
    }

    #[test]
    fn unprofitable_cycle_is_negative() {
        // Borrow 1000 USDC, buy 5 SOL, come back with +0.05% gross.
        let gas = GasParams {
            priority_fee_micro: 25_000,
            compute_unit_limit: 400_000,
            tip_lamports: 0,
            use_tip: false,
        };
        let breakdown = compute_profit(
            1_000_000_000,
            5_000_000,
            1_000_500_000,
            9,
            &gas,
            USDC_FAKE,
            NATIVE_MINT,
        );
        assert_eq!(breakdown.flash_fee, 900_000);
        assert_eq!(breakdown.gas_lamports, 15_000);
        // 15_000 lamports * 1e9 borrow / 5e6 leg1_out
        assert_eq!(breakdown.gas_in_token, 3_000_000);
        assert_eq!(breakdown.expected_profit, -3_400_000);
        assert_eq!(breakdown.profit_bps, -34);
    }

    #[test]
    fn native_borrow_uses_lamports_directly() {
        let gas = GasParams {
            priority_fee_micro: 0,
            compute_unit_limit: 0,
            tip_lamports: 0,
            use_tip: false,
        };
        let breakdown = compute_profit(
            10 * LAMPORTS_PER_SOL,
            1_400_000_000,
            10 * LAMPORTS_PER_SOL + 10_000,
            0,
            &gas,
            NATIVE_MINT,
            USDC_FAKE,
        );
        assert_eq!(breakdown.gas_in_token, BASE_FEE_LAMPORTS);
        assert_eq!(breakdown.expected_profit, 10_000 - BASE_FEE_LAMPORTS as i128);
    }

    #[test]
    fn static_price_bridges_non_native_legs() {
        let cost = gas_cost_in_token(1_000_000_000, 1, 1, USDC_FAKE, USDC_FAKE);
        // One whole SOL of gas at the static price
        assert_eq!(cost as u128, STATIC_SOL_PRICE_TOKEN_UNITS);
    }

    const USDC_FAKE: Pubkey = crate::config::USDC_MINT;

    proptest! {
        #[test]
        fn flash_fee_is_ceiling(borrow in 1u64..=u64::MAX / 10_000, fee_bps in 0u16..=10_000) {
            let fee = flash_loan_fee(borrow, fee_bps) as u128;
            let product = borrow as u128 * fee_bps as u128;
            prop_assert!(fee * 10_000 >= product);
            if fee > 0 {
                prop_assert!(product > (fee - 1) * 10_000);
            }
        }

        #[test]
        fn profit_identity_holds(
            borrow in 1u64..=1_000_000_000_000,
            leg1_out in 1u64..=1_000_000_000_000,
            final_out in 0u64..=1_000_000_000_000,
            fee_bps in 0u16..=10_000,
            priority in 0u64..=1_000_000,
            cu in 0u32..=1_400_000,
        ) {
            let gas = GasParams {
                priority_fee_micro: priority,
                compute_unit_limit: cu,
                tip_lamports: 0,
                use_tip: false,
            };
            let b = compute_profit(borrow, leg1_out, final_out, fee_bps, &gas, USDC_FAKE, NATIVE_MINT);
            let expected = final_out as i128
                - borrow as i128
                - b.flash_fee as i128
                - b.gas_in_token as i128;
            prop_assert_eq!(b.expected_profit, expected);
            let bps = (expected * 10_000 / borrow as i128).clamp(i32::MIN as i128, i32::MAX as i128);
            prop_assert_eq!(b.profit_bps as i128, bps);
        }
    }
}
