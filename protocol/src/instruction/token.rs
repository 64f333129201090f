//! Confidential-transfer extension instructions for the token program.
//!
//! ```text
//! data = [27] [sub-tag] payload
//!
//! sub-tag  operation               payload
//! 2        ConfigureAccount        pubkey(32) decryptable(36) max_credits(u64) offset(i8)
//! 5        Deposit                 amount(u64) decimals(u8) ciphertext(64) offset(i8)
//! 6        Withdraw                amount(u64) decimals(u8) decryptable(36) eq(i8) range(i8)
//! 7        Transfer                ciphertext(64) dest_handle(32) decryptable(36) eq(i8) val(i8) range(i8)
//! 8        ApplyPendingBalance     expected_credits(u64) decryptable(36)
//! ```
//!
//! Integers are little endian. A proof offset is relative to this
//! instruction inside the same transaction, or 0 when the proof was verified
//! into a context-state account.

use super::{AccountMeta, AccountRole, Address, Instruction};
use crate::config::INSTRUCTIONS_SYSVAR_ID;
use crate::crypto::{Ciphertext, DecryptableBalance, ElGamalPubkey};

/// Discriminator of the confidential-transfer extension.
pub const CONFIDENTIAL_TRANSFER_EXTENSION: u8 = 27;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConfidentialTransferInstruction {
    ConfigureAccount = 2,
    Deposit = 5,
    Withdraw = 6,
    Transfer = 7,
    ApplyPendingBalance = 8,
}

impl ConfidentialTransferInstruction {
    /// Read the sub-instruction from extension instruction data.
    pub fn unpack(data: &[u8]) -> Option<Self> {
        match data {
            [CONFIDENTIAL_TRANSFER_EXTENSION, 2, ..] => Some(Self::ConfigureAccount),
            [CONFIDENTIAL_TRANSFER_EXTENSION, 5, ..] => Some(Self::Deposit),
            [CONFIDENTIAL_TRANSFER_EXTENSION, 6, ..] => Some(Self::Withdraw),
            [CONFIDENTIAL_TRANSFER_EXTENSION, 7, ..] => Some(Self::Transfer),
            [CONFIDENTIAL_TRANSFER_EXTENSION, 8, ..] => Some(Self::ApplyPendingBalance),
            _ => None,
        }
    }
}

/// Where the token program finds a verified proof.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProofLocation {
    /// Verify instruction at this relative offset in the same transaction.
    InstructionOffset(i8),
    /// Proof already verified into this context-state account.
    ContextStateAccount(Address),
}

/// The accounts every confidential token instruction touches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenAccountKeys {
    pub token_account: Address,
    pub mint: Address,
    pub owner: Address,
}

/// Proof locations for a transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TransferProofLocations {
    pub equality: Option<ProofLocation>,
    pub validity: Option<ProofLocation>,
    /// Range proof over the remaining source balance.
    pub range: Option<ProofLocation>,
    /// Range proof over the transfer amount.
    pub amount_range: Option<ProofLocation>,
}

struct Builder {
    accounts: Vec<AccountMeta>,
    data: Vec<u8>,
    sysvar_added: bool,
}

impl Builder {
    fn new(sub: ConfidentialTransferInstruction) -> Self {
        Self {
            accounts: Vec::new(),
            data: vec![CONFIDENTIAL_TRANSFER_EXTENSION, sub as u8],
            sysvar_added: false,
        }
    }

    fn account(mut self, address: Address, role: AccountRole) -> Self {
        self.accounts.push(AccountMeta { address, role });
        self
    }

    fn bytes(mut self, bytes: &[u8]) -> Self {
        self.data.extend_from_slice(bytes);
        self
    }

    /// Add the account a proof lives in and return the offset to encode.
    fn proof(&mut self, location: Option<ProofLocation>) -> i8 {
        match location {
            None => 0,
            Some(ProofLocation::ContextStateAccount(address)) => {
                self.accounts.push(AccountMeta::readonly(address));
                0
            }
            Some(ProofLocation::InstructionOffset(offset)) => {
                if !self.sysvar_added {
                    self.accounts.push(AccountMeta::readonly(INSTRUCTIONS_SYSVAR_ID));
                    self.sysvar_added = true;
                }
                offset
            }
        }
    }

    fn offsets(mut self, offsets: &[i8]) -> Self {
        self.data.extend(offsets.iter().map(|o| *o as u8));
        self
    }

    fn finish(self, program_id: Address) -> Instruction {
        Instruction::new(program_id, self.accounts, self.data)
    }
}

pub fn configure_account(
    program_id: Address,
    keys: &TokenAccountKeys,
    pubkey: &ElGamalPubkey,
    decryptable_zero_balance: &DecryptableBalance,
    maximum_pending_balance_credit_counter: u64,
    proof: Option<ProofLocation>,
) -> Instruction {
    let mut b = Builder::new(ConfidentialTransferInstruction::ConfigureAccount)
        .account(keys.token_account, AccountRole::Writable)
        .account(keys.mint, AccountRole::Readonly);
    let offset = b.proof(proof);
    b.account(keys.owner, AccountRole::ReadonlySigner)
        .bytes(&pubkey.to_bytes())
        .bytes(&decryptable_zero_balance.to_bytes())
        .bytes(&maximum_pending_balance_credit_counter.to_le_bytes())
        .offsets(&[offset])
        .finish(program_id)
}

pub fn deposit(
    program_id: Address,
    keys: &TokenAccountKeys,
    amount: u64,
    decimals: u8,
    encrypted_amount: &Ciphertext,
    proof: Option<ProofLocation>,
) -> Instruction {
    let mut b = Builder::new(ConfidentialTransferInstruction::Deposit)
        .account(keys.token_account, AccountRole::Writable)
        .account(keys.mint, AccountRole::Readonly);
    let offset = b.proof(proof);
    b.account(keys.owner, AccountRole::ReadonlySigner)
        .bytes(&amount.to_le_bytes())
        .bytes(&[decimals])
        .bytes(&encrypted_amount.to_bytes())
        .offsets(&[offset])
        .finish(program_id)
}

pub fn withdraw(
    program_id: Address,
    keys: &TokenAccountKeys,
    amount: u64,
    decimals: u8,
    new_decryptable_available_balance: &DecryptableBalance,
    equality: Option<ProofLocation>,
    range: Option<ProofLocation>,
) -> Instruction {
    let mut b = Builder::new(ConfidentialTransferInstruction::Withdraw)
        .account(keys.token_account, AccountRole::Writable)
        .account(keys.mint, AccountRole::Readonly);
    let eq = b.proof(equality);
    let rg = b.proof(range);
    b.account(keys.owner, AccountRole::ReadonlySigner)
        .bytes(&amount.to_le_bytes())
        .bytes(&[decimals])
        .bytes(&new_decryptable_available_balance.to_bytes())
        .offsets(&[eq, rg])
        .finish(program_id)
}

/// `keys.token_account` is the source; `destination` is credited.
pub fn transfer(
    program_id: Address,
    keys: &TokenAccountKeys,
    destination: Address,
    encrypted_transfer_amount: &Ciphertext,
    destination_handle: &[u8; 32],
    new_decryptable_available_balance: &DecryptableBalance,
    proofs: TransferProofLocations,
) -> Instruction {
    let mut b = Builder::new(ConfidentialTransferInstruction::Transfer)
        .account(keys.token_account, AccountRole::Writable)
        .account(keys.mint, AccountRole::Readonly)
        .account(destination, AccountRole::Writable);
    let eq = b.proof(proofs.equality);
    let val = b.proof(proofs.validity);
    let rg = b.proof(proofs.range);
    let amt = b.proof(proofs.amount_range);
    b.account(keys.owner, AccountRole::ReadonlySigner)
        .bytes(&encrypted_transfer_amount.to_bytes())
        .bytes(destination_handle)
        .bytes(&new_decryptable_available_balance.to_bytes())
        .offsets(&[eq, val, rg, amt])
        .finish(program_id)
}

pub fn apply_pending_balance(
    program_id: Address,
    keys: &TokenAccountKeys,
    expected_pending_balance_credit_counter: u64,
    new_decryptable_available_balance: &DecryptableBalance,
) -> Instruction {
    Builder::new(ConfidentialTransferInstruction::ApplyPendingBalance)
        .account(keys.token_account, AccountRole::Writable)
        .account(keys.owner, AccountRole::ReadonlySigner)
        .bytes(&expected_pending_balance_credit_counter.to_le_bytes())
        .bytes(&new_decryptable_available_balance.to_bytes())
        .finish(program_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TOKEN_PROGRAM_ID;
    use crate::crypto::{AeKey, ElGamalKeypair};

    fn keys() -> TokenAccountKeys {
        TokenAccountKeys {
            token_account: Address::new([1u8; 32]),
            mint: Address::new([2u8; 32]),
            owner: Address::new([3u8; 32]),
        }
    }

    #[test]
    fn configure_layout() {
        let kp = ElGamalKeypair::generate();
        let zero = AeKey::derive(kp.secret()).encrypt(0).unwrap();
        let ix = configure_account(
            TOKEN_PROGRAM_ID,
            &keys(),
            kp.pubkey(),
            &zero,
            65_536,
            Some(ProofLocation::InstructionOffset(-1)),
        );
        assert_eq!(ix.data[..2], [27, 2]);
        assert_eq!(ix.data.len(), 2 + 32 + 36 + 8 + 1);
        assert_eq!(*ix.data.last().unwrap() as i8, -1);
        assert_eq!(ix.accounts[2], AccountMeta::readonly(INSTRUCTIONS_SYSVAR_ID));
        assert!(ix.accounts[3].role.is_signer());
        assert_eq!(
            ConfidentialTransferInstruction::unpack(&ix.data),
            Some(ConfidentialTransferInstruction::ConfigureAccount)
        );
    }

    #[test]
    fn local_proofs_add_no_accounts() {
        let kp = ElGamalKeypair::generate();
        let (ct, _) = kp.pubkey().encrypt(5);
        let ix = deposit(TOKEN_PROGRAM_ID, &keys(), 5, 6, &ct, None);
        assert_eq!(ix.accounts.len(), 3);
        assert_eq!(ix.data.len(), 2 + 8 + 1 + 64 + 1);
        assert_eq!(ix.data[2..10], 5u64.to_le_bytes());
    }

    #[test]
    fn sysvar_listed_once_for_several_proofs() {
        let kp = ElGamalKeypair::generate();
        let balance = AeKey::derive(kp.secret()).encrypt(1).unwrap();
        let ix = withdraw(
            TOKEN_PROGRAM_ID,
            &keys(),
            9,
            0,
            &balance,
            Some(ProofLocation::InstructionOffset(1)),
            Some(ProofLocation::InstructionOffset(2)),
        );
        let sysvars = ix
            .accounts
            .iter()
            .filter(|m| m.address == INSTRUCTIONS_SYSVAR_ID)
            .count();
        assert_eq!(sysvars, 1);
        assert_eq!(ix.data[ix.data.len() - 2..], [1, 2]);
    }

    #[test]
    fn transfer_with_context_accounts() {
        let src = ElGamalKeypair::generate();
        let (ct, _) = src.pubkey().encrypt(5);
        let balance = AeKey::derive(src.secret()).encrypt(0).unwrap();
        let ctx = |b| Some(ProofLocation::ContextStateAccount(Address::new([b; 32])));
        let ix = transfer(
            TOKEN_PROGRAM_ID,
            &keys(),
            Address::new([4u8; 32]),
            &ct,
            &[7u8; 32],
            &balance,
            TransferProofLocations {
                equality: ctx(10),
                validity: ctx(11),
                range: ctx(12),
                amount_range: ctx(13),
            },
        );
        assert_eq!(ix.accounts.len(), 8);
        assert_eq!(ix.accounts[3].address, Address::new([10u8; 32]));
        assert_eq!(ix.accounts[6].address, Address::new([13u8; 32]));
        assert_eq!(ix.data[ix.data.len() - 4..], [0, 0, 0, 0]);
        assert_eq!(ix.data.len(), 2 + 64 + 32 + 36 + 4);
    }

    #[test]
    fn apply_pending_layout() {
        let kp = ElGamalKeypair::generate();
        let balance = AeKey::derive(kp.secret()).encrypt(12).unwrap();
        let ix = apply_pending_balance(TOKEN_PROGRAM_ID, &keys(), 3, &balance);
        assert_eq!(ix.data[..2], [27, 8]);
        assert_eq!(ix.data.len(), 2 + 8 + 36);
        assert_eq!(ix.accounts.len(), 2);
    }

    #[test]
    fn unpack_rejects_other_extensions() {
        assert_eq!(ConfidentialTransferInstruction::unpack(&[26, 2]), None);
        assert_eq!(ConfidentialTransferInstruction::unpack(&[27]), None);
        assert_eq!(ConfidentialTransferInstruction::unpack(&[27, 99]), None);
    }
}
