//! Flash-loan program boundary.
//!
//! The program is an opaque instruction factory with two calls: `borrow`
//! and `repay`. Atomicity is enforced on-chain through a receipt account
//! created on borrow and closed on repay; a transaction that borrows
//! without repaying leaves the receipt occupied and blocks the signer's
//! next borrow. The admin-only `set_fee` call backs the one-shot fee-update
//! path.

use solana_sdk::instruction::{AccountMeta, Instruction};
use solana_sdk::pubkey::Pubkey;
use solana_sdk::system_program;

use crate::error::{BotError, Result};

pub const POOL_SEED: &[u8] = b"flash_pool";
pub const RECEIPT_SEED: &[u8] = b"flash_loan_receipt";

pub(crate) const BORROW_DISCRIMINATOR: [u8; 8] = [0x2e, 0x9c, 0x5d, 0x64, 0xa1, 0x5f, 0x27, 0x08];
pub(crate) const REPAY_DISCRIMINATOR: [u8; 8] = [0x9a, 0x31, 0xfa, 0x4b, 0x0c, 0xe7, 0x88, 0x51];
pub(crate) const SET_FEE_DISCRIMINATOR: [u8; 8] = [0x12, 0xd5, 0x60, 0x2f, 0x43, 0x7b, 0x9e, 0xaa];

/// Decoded flash-loan pool account.
#[derive(Debug, Clone, Copy)]
pub struct FlashPoolState {
    pub admin: Pubkey,
    pub token_mint: Pubkey,
    pub vault: Pubkey,
    pub total_deposits: u64,
    pub total_shares: u64,
    pub total_fees_earned: u64,
    pub fee_basis_points: u16,
    pub is_active: bool,
}

impl FlashPoolState {
    pub const LEN: usize = 8 + 32 * 3 + 8 * 3 + 2 + 1;

    /// Decode the account data: 8-byte discriminator, then fields in
    /// declaration order, little-endian.
    pub fn decode(data: &[u8]) -> Result<Self> {
        if data.len() < Self::LEN {
            return Err(BotError::Payload(format!(
                "flash pool account too short: {} bytes",
                data.len()
            )));
        }
        let pubkey_at = |offset: usize| Pubkey::try_from(&data[offset..offset + 32]).unwrap();
        let u64_at = |offset: usize| u64::from_le_bytes(data[offset..offset + 8].try_into().unwrap());
        Ok(Self {
            admin: pubkey_at(8),
            token_mint: pubkey_at(40),
            vault: pubkey_at(72),
            total_deposits: u64_at(104),
            total_shares: u64_at(112),
            total_fees_earned: u64_at(120),
            fee_basis_points: u16::from_le_bytes(data[128..130].try_into().unwrap()),
            is_active: data[130] != 0,
        })
    }
}

/// Instruction factory bound to one pool.
#[derive(Debug, Clone, Copy)]
pub struct FlashLoanProgram {
    pub program_id: Pubkey,
    pub pool: Pubkey,
    pub vault: Pubkey,
    pub token_mint: Pubkey,
}

impl FlashLoanProgram {
    pub fn new(program_id: Pubkey, pool: Pubkey, vault: Pubkey, token_mint: Pubkey) -> Self {
        Self {
            program_id,
            pool,
            vault,
            token_mint,
        }
    }

    /// The pool account for a given flash-loan token.
    pub fn pool_address(program_id: &Pubkey, token_mint: &Pubkey) -> Pubkey {
        Pubkey::find_program_address(&[POOL_SEED, token_mint.as_ref()], program_id).0
    }

    /// The borrower's receipt account. At most one unrepaid borrow can
    /// exist per (pool, borrower).
    pub fn receipt_address(&self, borrower: &Pubkey) -> Pubkey {
        Pubkey::find_program_address(
            &[RECEIPT_SEED, self.pool.as_ref(), borrower.as_ref()],
            &self.program_id,
        )
        .0
    }

    pub fn borrow(&self, borrower: Pubkey, borrower_ata: Pubkey, amount: u64) -> Instruction {
        let mut data = BORROW_DISCRIMINATOR.to_vec();
        data.extend_from_slice(&amount.to_le_bytes());
        Instruction {
            program_id: self.program_id,
            accounts: vec![
                AccountMeta::new(self.pool, false),
                AccountMeta::new(self.receipt_address(&borrower), false),
                AccountMeta::new(self.vault, false),
                AccountMeta::new(borrower_ata, false),
                AccountMeta::new(borrower, true),
                AccountMeta::new_readonly(system_program::id(), false),
                AccountMeta::new_readonly(spl_token::id(), false),
            ],
            data,
        }
    }

    pub fn repay(&self, borrower: Pubkey, borrower_ata: Pubkey) -> Instruction {
        Instruction {
            program_id: self.program_id,
            accounts: vec![
                AccountMeta::new(self.pool, false),
                AccountMeta::new(self.receipt_address(&borrower), false),
                AccountMeta::new(self.vault, false),
                AccountMeta::new(borrower_ata, false),
                AccountMeta::new(borrower, true),
                AccountMeta::new_readonly(spl_token::id(), false),
            ],
            data: REPAY_DISCRIMINATOR.to_vec(),
        }
    }

    /// Admin-only fee update.
    pub fn set_fee(&self, admin: Pubkey, fee_bps: u16) -> Instruction {
        let mut data = SET_FEE_DISCRIMINATOR.to_vec();
        data.extend_from_slice(&fee_bps.to_le_bytes());
        Instruction {
            program_id: self.program_id,
            accounts: vec![
                AccountMeta::new(self.pool, false),
                AccountMeta::new_readonly(admin, true),
            ],
            data,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn program() -> FlashLoanProgram {
        let program_id = Pubkey::new_unique();
        let token_mint = Pubkey::new_unique();
        let pool = FlashLoanProgram::pool_address(&program_id, &token_mint);
        FlashLoanProgram::new(program_id, pool, Pubkey::new_unique(), token_mint)
    }

    #[test]
    fn receipt_derivation_is_deterministic() {
        let p = program();
        let borrower = Pubkey::new_unique();
        assert_eq!(p.receipt_address(&borrower), p.receipt_address(&borrower));
        assert_ne!(
            p.receipt_address(&borrower),
            p.receipt_address(&Pubkey::new_unique())
        );
    }

    #[test]
    fn borrow_and_repay_share_the_receipt() {
        let p = program();
        let borrower = Pubkey::new_unique();
        let ata = Pubkey::new_unique();

        let borrow = p.borrow(borrower, ata, 1_000_000);
        let repay = p.repay(borrower, ata);

        assert_eq!(borrow.program_id, repay.program_id);
        assert_eq!(borrow.accounts[1].pubkey, repay.accounts[1].pubkey);
        assert_eq!(&borrow.data[..8], &BORROW_DISCRIMINATOR);
        assert_eq!(
            u64::from_le_bytes(borrow.data[8..16].try_into().unwrap()),
            1_000_000
        );
        assert_eq!(repay.data, REPAY_DISCRIMINATOR.to_vec());
        // Borrower signs both legs.
        assert!(borrow.accounts[4].is_signer);
        assert!(repay.accounts[4].is_signer);
    }

    #[test]
    fn pool_state_round_trips_through_decode() {
        let admin = Pubkey::new_unique();
        let token_mint = Pubkey::new_unique();
        let vault = Pubkey::new_unique();

        let mut data = vec![0u8; FlashPoolState::LEN];
        data[8..40].copy_from_slice(admin.as_ref());
        data[40..72].copy_from_slice(token_mint.as_ref());
        data[72..104].copy_from_slice(vault.as_ref());
        data[104..112].copy_from_slice(&50_000_000_000u64.to_le_bytes());
        data[112..120].copy_from_slice(&49_000_000_000u64.to_le_bytes());
        data[120..128].copy_from_slice(&123_456u64.to_le_bytes());
        data[128..130].copy_from_slice(&9u16.to_le_bytes());
        data[130] = 1;

        let state = FlashPoolState::decode(&data).unwrap();
        assert_eq!(state.admin, admin);
        assert_eq!(state.token_mint, token_mint);
        assert_eq!(state.vault, vault);
        assert_eq!(state.total_deposits, 50_000_000_000);
        assert_eq!(state.fee_basis_points, 9);
        assert!(state.is_active);
    }

    #[test]
    fn pool_state_rejects_short_account() {
        assert!(FlashPoolState::decode(&[0u8; 64]).is_err());
    }
}
