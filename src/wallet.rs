//! Wallet helpers: keypair loading, balances, associated token accounts.
//!
//! ATA derivation must use the program that owns the mint; Token-2022 mints
//! derive a different address than legacy mints.

use std::sync::Arc;

use solana_client::nonblocking::rpc_client::RpcClient;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::{read_keypair_file, Keypair};
use solana_sdk::signer::Signer;
use solana_sdk::transaction::Transaction;
use spl_associated_token_account::get_associated_token_address_with_program_id;
use spl_associated_token_account::instruction::create_associated_token_account_idempotent;
use tracing::{debug, info};

use crate::config::{TOKEN_2022_PROGRAM, TOKEN_PROGRAM};
use crate::error::{BotError, Result};

pub fn load_keypair(path: &str) -> Result<Keypair> {
    read_keypair_file(path)
        .map_err(|e| BotError::PreflightFailed(format!("cannot read keypair {path}: {e}")))
}

pub async fn lamport_balance(rpc: &RpcClient, owner: &Pubkey) -> Result<u64> {
    Ok(rpc.get_balance(owner).await?)
}

/// Which token program owns this mint. Unknown owners fall back to the
/// legacy token program.
pub async fn token_program_for_mint(rpc: &RpcClient, mint: &Pubkey) -> Result<Pubkey> {
    match rpc.get_account(mint).await {
        Ok(account) if account.owner == TOKEN_2022_PROGRAM => Ok(TOKEN_2022_PROGRAM),
        Ok(_) => Ok(TOKEN_PROGRAM),
        Err(e) => {
            debug!(%mint, error = %e, "mint account fetch failed, assuming legacy token program");
            Ok(TOKEN_PROGRAM)
        }
    }
}

pub fn ata_address(owner: &Pubkey, mint: &Pubkey, token_program: &Pubkey) -> Pubkey {
    get_associated_token_address_with_program_id(owner, mint, token_program)
}

/// Make sure the signer's ATA for `mint` exists, creating it idempotently
/// when missing. Returns the ATA address.
pub async fn ensure_ata(
    rpc: &RpcClient,
    keypair: &Arc<Keypair>,
    mint: &Pubkey,
) -> Result<Pubkey> {
    let owner = keypair.pubkey();
    let token_program = token_program_for_mint(rpc, mint).await?;
    let ata = ata_address(&owner, mint, &token_program);

    if rpc.get_account(&ata).await.is_ok() {
        return Ok(ata);
    }

    info!(%mint, %ata, "creating associated token account");
    let instruction =
        create_associated_token_account_idempotent(&owner, &owner, mint, &token_program);
    let blockhash = rpc.get_latest_blockhash().await?;
    let tx = Transaction::new_signed_with_payer(
        &[instruction],
        Some(&owner),
        &[keypair.as_ref()],
        blockhash,
    );
    rpc.send_and_confirm_transaction(&tx).await?;
    Ok(ata)
}

/// Raw token balance of an ATA; missing accounts read as zero.
pub async fn token_balance(rpc: &RpcClient, ata: &Pubkey) -> u64 {
    match rpc.get_token_account_balance(ata).await {
        Ok(balance) => balance.amount.parse().unwrap_or(0),
        Err(_) => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use solana_sdk::signature::write_keypair_file;

    #[test]
    fn keypair_round_trips_through_file() {
        let keypair = Keypair::new();
        let path = std::env::temp_dir().join(format!("wallet-test-{}.json", keypair.pubkey()));
        write_keypair_file(&keypair, &path).unwrap();

        let loaded = load_keypair(path.to_str().unwrap()).unwrap();
        assert_eq!(loaded.pubkey(), keypair.pubkey());
        std::fs::remove_file(path).ok();
    }

    #[test]
    fn missing_keypair_is_a_preflight_failure() {
        let err = load_keypair("/nonexistent/wallet.json").unwrap_err();
        assert!(matches!(err, BotError::PreflightFailed(_)));
    }

    #[test]
    fn ata_depends_on_token_program() {
        let owner = Pubkey::new_unique();
        let mint = Pubkey::new_unique();
        let legacy = ata_address(&owner, &mint, &TOKEN_PROGRAM);
        let token_2022 = ata_address(&owner, &mint, &TOKEN_2022_PROGRAM);
        assert_ne!(legacy, token_2022);
        // Derivation is a pure function of (owner, mint, program).
        assert_eq!(legacy, ata_address(&owner, &mint, &TOKEN_PROGRAM));
    }
}
