//! Transaction composer.
//!
//! Turns a scanned opportunity into one signed atomic transaction:
//! compute-budget header, flash-loan borrow, the venue swaps, flash-loan
//! repay, and optionally a tip transfer last. The opportunity's cached
//! quotes are consumed verbatim; only the per-leg instruction bundles are
//! re-fetched. The composed message is compiled against a freshly fetched
//! block reference which is returned alongside the transaction so the
//! caller confirms against the same reference.

use std::sync::Arc;

use futures::try_join;
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_sdk::address_lookup_table::AddressLookupTableAccount;
use solana_sdk::commitment_config::CommitmentConfig;
use solana_sdk::compute_budget::ComputeBudgetInstruction;
use solana_sdk::hash::Hash;
use solana_sdk::instruction::Instruction;
use solana_sdk::message::{v0, VersionedMessage};
use solana_sdk::packet::PACKET_DATA_SIZE;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Keypair;
use solana_sdk::signer::Signer;
use solana_sdk::transaction::VersionedTransaction;
use tracing::debug;

use crate::config::{
    NATIVE_MINT, TRIANGULAR_FRESHNESS_MS, TRIANGULAR_MIN_CU_LIMIT, TWO_LEG_FRESHNESS_MS,
};
use crate::error::{BotError, Result};
use crate::flash_loan::FlashLoanProgram;
use crate::provider::{ProviderGateway, SwapInstructionBundle};
use crate::types::{now_ms, ArbitrageOpportunity, TriangularOpportunity};

/// A signed transaction plus the block reference it was built against.
#[derive(Debug)]
pub struct ComposedTransaction {
    pub tx: VersionedTransaction,
    pub blockhash: Hash,
    pub last_valid_block_height: u64,
}

pub struct TransactionComposer {
    gateway: Arc<ProviderGateway>,
    rpc: Arc<RpcClient>,
    keypair: Arc<Keypair>,
    flash_loan: FlashLoanProgram,
    priority_fee_micro: u64,
    compute_unit_limit: u32,
}

impl TransactionComposer {
    pub fn new(
        gateway: Arc<ProviderGateway>,
        rpc: Arc<RpcClient>,
        keypair: Arc<Keypair>,
        flash_loan: FlashLoanProgram,
        priority_fee_micro: u64,
        compute_unit_limit: u32,
    ) -> Self {
        Self {
            gateway,
            rpc,
            keypair,
            flash_loan,
            priority_fee_micro,
            compute_unit_limit,
        }
    }

    /// Compose a two-leg cycle: borrow, swap out and back, repay.
    pub async fn compose_two_leg(
        &self,
        opportunity: &ArbitrageOpportunity,
        borrower_ata: Pubkey,
        tip: Option<Instruction>,
    ) -> Result<ComposedTransaction> {
        check_freshness(opportunity.timestamp_ms, TWO_LEG_FRESHNESS_MS)?;

        let user = self.keypair.pubkey();
        // Native wrapping conflicts with the flash-loan token account's
        // balance invariant, so it is only requested when no leg touches SOL.
        let wrap_native =
            opportunity.token_a != NATIVE_MINT && opportunity.token_b != NATIVE_MINT;

        let (leg1, leg2) = try_join!(
            self.gateway
                .swap_instructions(&opportunity.quote_leg1, user, wrap_native, false),
            self.gateway
                .swap_instructions(&opportunity.quote_leg2, user, wrap_native, true),
        )?;

        let borrow = self
            .flash_loan
            .borrow(user, borrower_ata, opportunity.borrow_amount);
        let repay = self.flash_loan.repay(user, borrower_ata);
        let instructions = assemble_instructions(
            self.compute_unit_limit,
            self.priority_fee_micro,
            borrow,
            &[leg1.clone(), leg2.clone()],
            repay,
            tip,
        );

        self.finalize(instructions, &[&leg1, &leg2]).await
    }

    /// Compose a triangular cycle; same sandwich with a third leg block and
    /// a raised compute ceiling.
    pub async fn compose_triangular(
        &self,
        opportunity: &TriangularOpportunity,
        borrower_ata: Pubkey,
        tip: Option<Instruction>,
    ) -> Result<ComposedTransaction> {
        check_freshness(opportunity.timestamp_ms, TRIANGULAR_FRESHNESS_MS)?;

        let user = self.keypair.pubkey();
        let route = &opportunity.route;
        let wrap_native = route.token_a != NATIVE_MINT
            && route.token_b != NATIVE_MINT
            && route.token_c != NATIVE_MINT;

        let (leg1, leg2, leg3) = try_join!(
            self.gateway
                .swap_instructions(&opportunity.quote_leg1, user, wrap_native, false),
            self.gateway
                .swap_instructions(&opportunity.quote_leg2, user, wrap_native, true),
            self.gateway
                .swap_instructions(&opportunity.quote_leg3, user, wrap_native, true),
        )?;

        let borrow = self
            .flash_loan
            .borrow(user, borrower_ata, route.borrow_amount);
        let repay = self.flash_loan.repay(user, borrower_ata);
        let instructions = assemble_instructions(
            self.compute_unit_limit.max(TRIANGULAR_MIN_CU_LIMIT),
            self.priority_fee_micro,
            borrow,
            &[leg1.clone(), leg2.clone(), leg3.clone()],
            repay,
            tip,
        );

        self.finalize(instructions, &[&leg1, &leg2, &leg3]).await
    }

    async fn finalize(
        &self,
        instructions: Vec<Instruction>,
        bundles: &[&SwapInstructionBundle],
    ) -> Result<ComposedTransaction> {
        let lookup_addresses = collect_lookup_addresses(bundles);
        let tables = self.gateway.load_lookup_tables(&lookup_addresses).await?;

        let (blockhash, last_valid_block_height) = self
            .rpc
            .get_latest_blockhash_with_commitment(CommitmentConfig::confirmed())
            .await?;

        let tx = build_and_sign(&instructions, &tables, &self.keypair, blockhash)?;
        debug!(
            instructions = instructions.len(),
            lookup_tables = tables.len(),
            last_valid_block_height,
            "transaction composed"
        );
        Ok(ComposedTransaction {
            tx,
            blockhash,
            last_valid_block_height,
        })
    }
}

fn check_freshness(timestamp_ms: u64, max_ms: u64) -> Result<()> {
    let age_ms = now_ms().saturating_sub(timestamp_ms);
    if age_ms > max_ms {
        return Err(BotError::QuotesStale { age_ms, max_ms });
    }
    Ok(())
}

/// The atomic sequence. Every leg after the first consumes the token-ledger
/// snapshot so it spends what actually arrived, not what was quoted;
/// without it, rounding differences revert the transaction mid-flight.
fn assemble_instructions(
    compute_unit_limit: u32,
    priority_fee_micro: u64,
    borrow: Instruction,
    legs: &[SwapInstructionBundle],
    repay: Instruction,
    tip: Option<Instruction>,
) -> Vec<Instruction> {
    let mut instructions = vec![
        ComputeBudgetInstruction::set_compute_unit_limit(compute_unit_limit),
        ComputeBudgetInstruction::set_compute_unit_price(priority_fee_micro),
        borrow,
    ];
    for (i, leg) in legs.iter().enumerate() {
        if i > 0 {
            if let Some(ledger) = &leg.token_ledger {
                instructions.push(ledger.clone());
            }
        }
        instructions.extend(leg.setup.iter().cloned());
        instructions.push(leg.swap.clone());
        if let Some(cleanup) = &leg.cleanup {
            instructions.push(cleanup.clone());
        }
    }
    instructions.push(repay);
    if let Some(tip) = tip {
        instructions.push(tip);
    }
    instructions
}

fn collect_lookup_addresses(bundles: &[&SwapInstructionBundle]) -> Vec<Pubkey> {
    let mut addresses = Vec::new();
    for bundle in bundles {
        for address in &bundle.lookup_tables {
            if !addresses.contains(address) {
                addresses.push(*address);
            }
        }
    }
    addresses
}

fn build_and_sign(
    instructions: &[Instruction],
    tables: &[AddressLookupTableAccount],
    keypair: &Keypair,
    blockhash: Hash,
) -> Result<VersionedTransaction> {
    let message = v0::Message::try_compile(&keypair.pubkey(), instructions, tables, blockhash)
        .map_err(|e| BotError::Build(e.to_string()))?;
    let tx = VersionedTransaction::try_new(VersionedMessage::V0(message), &[keypair])
        .map_err(|e| BotError::Build(e.to_string()))?;

    let bytes = bincode::serialized_size(&tx).map_err(|e| BotError::Build(e.to_string()))? as usize;
    if bytes > PACKET_DATA_SIZE {
        return Err(BotError::TransactionTooLarge {
            bytes,
            max: PACKET_DATA_SIZE,
        });
    }
    Ok(tx)
}
