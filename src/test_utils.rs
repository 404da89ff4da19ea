//! Test Utilities Module
//!
//! In-memory collaborators for deterministic tests:
//! - `MockLedger`: a `LedgerRpc` that executes the system, SPL token and
//!   associated-token-account instructions this crate builds, with
//!   scriptable send outcomes and a controllable block height
//! - `ScriptedProvider`: a `WalletProvider` backed by a local keypair with
//!   switches for rejection, withheld keys and withheld signatures
//!
//! These utilities are only compiled when running tests or when the
//! `test_utils` feature is enabled.

#![cfg(any(test, feature = "test_utils"))]

use crate::errors::{RpcError, WalletError};
use crate::network::{EndpointResolver, NetworkGateway};
use crate::rpc::{BlockhashInfo, LedgerRpc, SignatureStatus};
use crate::session::Session;
use crate::storage::ClientStore;
use crate::wallet::{ProviderEvent, ProviderRegistry, WalletKind, WalletProvider};
use async_trait::async_trait;
use parking_lot::Mutex;
use solana_sdk::{
    account::Account,
    commitment_config::{CommitmentConfig, CommitmentLevel},
    hash::Hash,
    pubkey::Pubkey,
    signature::{Keypair, Signature, Signer},
    system_program,
    transaction::Transaction,
};
use spl_associated_token_account::get_associated_token_address;
use spl_token::solana_program::{program_option::COption, program_pack::Pack};
use spl_token::{
    instruction::TokenInstruction,
    state::{Account as TokenAccount, AccountState, Mint},
};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;

pub const LAMPORTS_PER_SIGNATURE: u64 = 5_000;
/// Blocks a blockhash stays valid after it is issued
pub const BLOCKHASH_VALIDITY: u64 = 150;
/// Blocks produced between two `block_height` reads
const BLOCKS_PER_READ: u64 = 10;

/// Rent-exempt minimum for `data_len` bytes (default rent parameters)
pub fn rent_exempt_minimum(data_len: usize) -> u64 {
    (128 + data_len as u64) * 6_960
}

/// What the ledger does with the next submitted transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendBehavior {
    /// Execute and report confirmed
    Land,
    /// Reject at submission with this RPC error message
    Fail(String),
    /// Accept but drop: never executed, never reported
    NeverConfirm,
    /// Execute, but never report a status (lands after the caller gave up)
    LandUnreported,
}

struct LedgerState {
    accounts: HashMap<Pubkey, Account>,
    blockhashes: Vec<Hash>,
    block_height: u64,
    frozen: bool,
    statuses: HashMap<Signature, Result<(), String>>,
    sent: Vec<Transaction>,
    script: VecDeque<SendBehavior>,
    failing_programs: HashMap<Pubkey, String>,
    fail_token_account_queries: bool,
}

/// In-memory ledger implementing `LedgerRpc`
pub struct MockLedger {
    endpoint: String,
    state: Mutex<LedgerState>,
}

impl Default for MockLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl MockLedger {
    pub fn new() -> Self {
        Self::with_endpoint("mock://ledger")
    }

    pub fn with_endpoint(endpoint: &str) -> Self {
        Self {
            endpoint: endpoint.to_string(),
            state: Mutex::new(LedgerState {
                accounts: HashMap::new(),
                blockhashes: Vec::new(),
                block_height: 1_000,
                frozen: false,
                statuses: HashMap::new(),
                sent: Vec::new(),
                script: VecDeque::new(),
                failing_programs: HashMap::new(),
                fail_token_account_queries: false,
            }),
        }
    }

    /// Credit a system account
    pub fn fund(&self, pubkey: &Pubkey, lamports: u64) {
        let mut state = self.state.lock();
        let account = state
            .accounts
            .entry(*pubkey)
            .or_insert_with(|| Account::new(0, 0, &system_program::id()));
        account.lamports += lamports;
    }

    pub fn lamports(&self, pubkey: &Pubkey) -> u64 {
        self.state
            .lock()
            .accounts
            .get(pubkey)
            .map(|a| a.lamports)
            .unwrap_or(0)
    }

    /// Queue outcomes for the next submissions; `Land` once the queue is empty
    pub fn script_sends(&self, behaviors: impl IntoIterator<Item = SendBehavior>) {
        self.state.lock().script.extend(behaviors);
    }

    /// Reject every transaction touching `program_id` with `message`
    pub fn fail_program(&self, program_id: Pubkey, message: &str) {
        self.state
            .lock()
            .failing_programs
            .insert(program_id, message.to_string());
    }

    pub fn fail_token_account_queries(&self) {
        self.state.lock().fail_token_account_queries = true;
    }

    /// Stop block production so blockhashes never expire
    pub fn freeze_block_height(&self) {
        self.state.lock().frozen = true;
    }

    pub fn is_landed(&self, signature: &Signature) -> bool {
        matches!(self.state.lock().statuses.get(signature), Some(Ok(())))
    }

    /// Every transaction passed to `send_transaction`, accepted or not
    pub fn sent_transactions(&self) -> Vec<Transaction> {
        self.state.lock().sent.clone()
    }

    pub fn issued_blockhashes(&self) -> Vec<Hash> {
        self.state.lock().blockhashes.clone()
    }

    pub fn mint(&self, address: &Pubkey) -> Option<Mint> {
        let state = self.state.lock();
        let account = state.accounts.get(address)?;
        Mint::unpack(&account.data).ok()
    }

    pub fn token_account(&self, address: &Pubkey) -> Option<TokenAccount> {
        let state = self.state.lock();
        let account = state.accounts.get(address)?;
        TokenAccount::unpack(&account.data).ok()
    }

    /// Initialized mints on the ledger, sorted
    pub fn mint_addresses(&self) -> Vec<Pubkey> {
        let state = self.state.lock();
        let mut mints: Vec<Pubkey> = state
            .accounts
            .iter()
            .filter(|(_, a)| a.owner == spl_token::id() && a.data.len() == Mint::LEN)
            .filter(|(_, a)| Mint::unpack(&a.data).is_ok())
            .map(|(k, _)| *k)
            .collect();
        mints.sort();
        mints
    }

    /// Place an initialized mint directly on the ledger
    pub fn create_mint(&self, authority: &Pubkey, decimals: u8) -> Pubkey {
        let address = Pubkey::new_unique();
        let mint = Mint {
            mint_authority: COption::Some(*authority),
            supply: 0,
            decimals,
            is_initialized: true,
            freeze_authority: COption::Some(*authority),
        };
        let mut account = Account::new(rent_exempt_minimum(Mint::LEN), Mint::LEN, &spl_token::id());
        let _ = Mint::pack(mint, &mut account.data);
        self.state.lock().accounts.insert(address, account);
        address
    }

    /// Place a funded associated token account directly on the ledger
    pub fn create_token_account(&self, owner: &Pubkey, mint: &Pubkey, amount: u64) -> Pubkey {
        let address = get_associated_token_address(owner, mint);
        let mut state = self.state.lock();
        state.accounts.insert(address, token_account(owner, mint, amount));
        if let Some(mint_account) = state.accounts.get_mut(mint) {
            if let Ok(mut mint_state) = Mint::unpack(&mint_account.data) {
                mint_state.supply += amount;
                let _ = Mint::pack(mint_state, &mut mint_account.data);
            }
        }
        address
    }
}

fn token_account(owner: &Pubkey, mint: &Pubkey, amount: u64) -> Account {
    let state = TokenAccount {
        mint: *mint,
        owner: *owner,
        amount,
        delegate: COption::None,
        state: AccountState::Initialized,
        is_native: COption::None,
        delegated_amount: 0,
        close_authority: COption::None,
    };
    let mut account = Account::new(
        rent_exempt_minimum(TokenAccount::LEN),
        TokenAccount::LEN,
        &spl_token::id(),
    );
    let _ = TokenAccount::pack(state, &mut account.data);
    account
}

fn read_u64(data: &[u8], offset: usize) -> Result<u64, String> {
    data.get(offset..offset + 8)
        .and_then(|b| b.try_into().ok())
        .map(u64::from_le_bytes)
        .ok_or_else(|| "invalid instruction data".to_string())
}

fn debit(accounts: &mut HashMap<Pubkey, Account>, from: &Pubkey, lamports: u64) -> Result<(), String> {
    let account = accounts
        .get_mut(from)
        .ok_or_else(|| "custom program error: 0x1".to_string())?;
    if account.lamports < lamports {
        return Err("custom program error: 0x1".to_string());
    }
    account.lamports -= lamports;
    Ok(())
}

/// Execute `tx` against `accounts`; the error string mimics preflight output
fn execute(accounts: &mut HashMap<Pubkey, Account>, tx: &Transaction) -> Result<(), String> {
    let message = &tx.message;
    let payer = message.account_keys[0];
    let fee = LAMPORTS_PER_SIGNATURE * u64::from(message.header.num_required_signatures);
    if accounts.get(&payer).map(|a| a.lamports).unwrap_or(0) < fee {
        return Err("Transaction simulation failed: Insufficient funds for fee".to_string());
    }
    debit(accounts, &payer, fee)?;

    for (index, ix) in message.instructions.iter().enumerate() {
        let program = message.account_keys[ix.program_id_index as usize];
        let keys: Vec<Pubkey> = ix
            .accounts
            .iter()
            .map(|i| message.account_keys[*i as usize])
            .collect();
        let signer = |position: usize| {
            ix.accounts
                .get(position)
                .map(|i| message.is_signer(*i as usize))
                .unwrap_or(false)
        };

        let result = if program == system_program::id() {
            execute_system(accounts, &keys, &ix.data)
        } else if program == spl_token::id() {
            execute_token(accounts, &keys, &ix.data, signer)
        } else if program == spl_associated_token_account::id() {
            execute_associated(accounts, &keys, &ix.data)
        } else {
            Err(format!("unsupported program {}", program))
        };

        result.map_err(|e| {
            format!(
                "Transaction simulation failed: Error processing Instruction {}: {}",
                index, e
            )
        })?;
    }
    Ok(())
}

fn execute_system(
    accounts: &mut HashMap<Pubkey, Account>,
    keys: &[Pubkey],
    data: &[u8],
) -> Result<(), String> {
    let tag = data
        .get(0..4)
        .and_then(|b| b.try_into().ok())
        .map(u32::from_le_bytes)
        .ok_or_else(|| "invalid instruction data".to_string())?;
    match tag {
        // CreateAccount { lamports, space, owner }
        0 => {
            let lamports = read_u64(data, 4)?;
            let space = read_u64(data, 12)? as usize;
            let owner = data
                .get(20..52)
                .and_then(|b| <[u8; 32]>::try_from(b).ok())
                .map(Pubkey::new_from_array)
                .ok_or_else(|| "invalid instruction data".to_string())?;
            let (from, new) = (keys[0], keys[1]);
            if accounts.get(&new).map(|a| a.lamports > 0).unwrap_or(false) {
                return Err("custom program error: 0x0".to_string());
            }
            debit(accounts, &from, lamports)?;
            accounts.insert(new, Account::new(lamports, space, &owner));
            Ok(())
        }
        // Transfer { lamports }
        2 => {
            let lamports = read_u64(data, 4)?;
            debit(accounts, &keys[0], lamports)?;
            accounts
                .entry(keys[1])
                .or_insert_with(|| Account::new(0, 0, &system_program::id()))
                .lamports += lamports;
            Ok(())
        }
        other => Err(format!("unsupported system instruction {}", other)),
    }
}

fn load_mint(accounts: &HashMap<Pubkey, Account>, address: &Pubkey) -> Result<Mint, String> {
    accounts
        .get(address)
        .filter(|a| a.owner == spl_token::id())
        .and_then(|a| Mint::unpack(&a.data).ok())
        .ok_or_else(|| "invalid account data for instruction".to_string())
}

fn load_token_account(
    accounts: &HashMap<Pubkey, Account>,
    address: &Pubkey,
) -> Result<TokenAccount, String> {
    accounts
        .get(address)
        .filter(|a| a.owner == spl_token::id())
        .and_then(|a| TokenAccount::unpack(&a.data).ok())
        .ok_or_else(|| "invalid account data for instruction".to_string())
}

fn store<T: Pack>(accounts: &mut HashMap<Pubkey, Account>, address: &Pubkey, value: T) -> Result<(), String> {
    let account = accounts
        .get_mut(address)
        .ok_or_else(|| "account not found".to_string())?;
    T::pack(value, &mut account.data).map_err(|e| e.to_string())
}

fn execute_token(
    accounts: &mut HashMap<Pubkey, Account>,
    keys: &[Pubkey],
    data: &[u8],
    signer: impl Fn(usize) -> bool,
) -> Result<(), String> {
    let instruction = TokenInstruction::unpack(data).map_err(|e| e.to_string())?;
    match instruction {
        TokenInstruction::InitializeMint {
            decimals,
            mint_authority,
            freeze_authority,
        } => {
            let address = keys[0];
            let account = accounts
                .get(&address)
                .filter(|a| a.owner == spl_token::id() && a.data.len() == Mint::LEN)
                .ok_or_else(|| "invalid account data for instruction".to_string())?;
            if account.lamports < rent_exempt_minimum(Mint::LEN) {
                // TokenError::NotRentExempt
                return Err("custom program error: 0x0".to_string());
            }
            let existing = Mint::unpack_unchecked(&account.data).map_err(|e| e.to_string())?;
            if existing.is_initialized {
                // TokenError::AlreadyInUse
                return Err("custom program error: 0x6".to_string());
            }
            let mint = Mint {
                mint_authority: COption::Some(mint_authority),
                supply: 0,
                decimals,
                is_initialized: true,
                freeze_authority,
            };
            store(accounts, &address, mint)
        }
        TokenInstruction::MintTo { amount } => {
            let (mint_address, destination, authority) = (keys[0], keys[1], keys[2]);
            let mut mint = load_mint(accounts, &mint_address)?;
            if mint.mint_authority != COption::Some(authority) || !signer(2) {
                // TokenError::OwnerMismatch
                return Err("custom program error: 0x4".to_string());
            }
            let mut holder = load_token_account(accounts, &destination)?;
            if holder.mint != mint_address {
                // TokenError::MintMismatch
                return Err("custom program error: 0x3".to_string());
            }
            mint.supply = mint
                .supply
                .checked_add(amount)
                .ok_or_else(|| "custom program error: 0xe".to_string())?;
            holder.amount += amount;
            store(accounts, &mint_address, mint)?;
            store(accounts, &destination, holder)
        }
        TokenInstruction::Transfer { amount } => {
            let (source, destination, owner) = (keys[0], keys[1], keys[2]);
            let mut from = load_token_account(accounts, &source)?;
            let mut to = load_token_account(accounts, &destination)?;
            if from.owner != owner || !signer(2) {
                return Err("custom program error: 0x4".to_string());
            }
            if from.mint != to.mint {
                return Err("custom program error: 0x3".to_string());
            }
            if from.amount < amount {
                // TokenError::InsufficientFunds
                return Err("custom program error: 0x1".to_string());
            }
            from.amount -= amount;
            to.amount += amount;
            store(accounts, &source, from)?;
            store(accounts, &destination, to)
        }
        other => Err(format!("unsupported token instruction {:?}", other)),
    }
}

fn execute_associated(
    accounts: &mut HashMap<Pubkey, Account>,
    keys: &[Pubkey],
    data: &[u8],
) -> Result<(), String> {
    let idempotent = matches!(data.first(), Some(1));
    let (payer, address, owner, mint) = (keys[0], keys[1], keys[2], keys[3]);
    if get_associated_token_address(&owner, &mint) != address {
        return Err("Provided seeds do not result in a valid address".to_string());
    }
    load_mint(accounts, &mint)?;
    if accounts.contains_key(&address) {
        return if idempotent {
            load_token_account(accounts, &address).map(|_| ())
        } else {
            Err("custom program error: 0x0".to_string())
        };
    }
    debit(accounts, &payer, rent_exempt_minimum(TokenAccount::LEN))?;
    accounts.insert(address, token_account(&owner, &mint, 0));
    Ok(())
}

#[async_trait]
impl LedgerRpc for MockLedger {
    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn minimum_balance_for_rent_exemption(&self, data_len: usize) -> Result<u64, RpcError> {
        Ok(rent_exempt_minimum(data_len))
    }

    async fn latest_blockhash(
        &self,
        _commitment: CommitmentConfig,
    ) -> Result<BlockhashInfo, RpcError> {
        let mut state = self.state.lock();
        let blockhash = Hash::new_unique();
        state.blockhashes.push(blockhash);
        Ok(BlockhashInfo {
            blockhash,
            last_valid_block_height: state.block_height + BLOCKHASH_VALIDITY,
        })
    }

    async fn send_transaction(
        &self,
        tx: &Transaction,
        _preflight: CommitmentLevel,
    ) -> Result<Signature, RpcError> {
        let mut state = self.state.lock();
        state.sent.push(tx.clone());
        let behavior = state.script.pop_front().unwrap_or(SendBehavior::Land);
        let reject = |message: String| RpcError::Response {
            endpoint: self.endpoint.clone(),
            message,
        };

        if let SendBehavior::Fail(message) = &behavior {
            return Err(reject(message.clone()));
        }
        if !state.blockhashes.contains(&tx.message.recent_blockhash) {
            return Err(reject(
                "Transaction simulation failed: Blockhash not found".to_string(),
            ));
        }
        if tx.verify().is_err() {
            return Err(reject(
                "Transaction signature verification failure".to_string(),
            ));
        }
        for ix in &tx.message.instructions {
            let program = tx.message.account_keys[ix.program_id_index as usize];
            if let Some(message) = state.failing_programs.get(&program) {
                return Err(reject(message.clone()));
            }
        }

        let mut accounts = state.accounts.clone();
        execute(&mut accounts, tx).map_err(reject)?;

        let signature = tx.signatures[0];
        match behavior {
            SendBehavior::Land => {
                state.accounts = accounts;
                state.statuses.insert(signature, Ok(()));
            }
            SendBehavior::LandUnreported => {
                state.accounts = accounts;
            }
            SendBehavior::NeverConfirm | SendBehavior::Fail(_) => {}
        }
        Ok(signature)
    }

    async fn signature_status(
        &self,
        signature: &Signature,
        _commitment: CommitmentConfig,
    ) -> Result<SignatureStatus, RpcError> {
        Ok(self.state.lock().statuses.get(signature).cloned())
    }

    async fn block_height(&self, _commitment: CommitmentConfig) -> Result<u64, RpcError> {
        let mut state = self.state.lock();
        let height = state.block_height;
        if !state.frozen {
            state.block_height += BLOCKS_PER_READ;
        }
        Ok(height)
    }

    async fn get_account(
        &self,
        pubkey: &Pubkey,
        _commitment: CommitmentConfig,
    ) -> Result<Option<Account>, RpcError> {
        Ok(self.state.lock().accounts.get(pubkey).cloned())
    }

    async fn token_accounts_by_owner(
        &self,
        owner: &Pubkey,
        mint: &Pubkey,
    ) -> Result<Vec<Pubkey>, RpcError> {
        let state = self.state.lock();
        if state.fail_token_account_queries {
            return Err(RpcError::Transport {
                endpoint: self.endpoint.clone(),
                message: "connection refused".to_string(),
            });
        }
        let mut found: Vec<Pubkey> = state
            .accounts
            .iter()
            .filter(|(_, a)| a.owner == spl_token::id() && a.data.len() == TokenAccount::LEN)
            .filter_map(|(k, a)| TokenAccount::unpack(&a.data).ok().map(|t| (*k, t)))
            .filter(|(_, t)| t.owner == *owner && t.mint == *mint)
            .map(|(k, _)| k)
            .collect();
        found.sort();
        Ok(found)
    }
}

/// Gateway whose every connection is backed by `ledger`
pub fn mock_gateway(ledger: Arc<MockLedger>) -> NetworkGateway {
    NetworkGateway::with_factory(
        EndpointResolver::new(),
        Arc::new(move |_, _| Ok(ledger.clone() as Arc<dyn LedgerRpc>)),
    )
}

/// Session over a temporary store and `ledger`
pub fn mock_session(ledger: Arc<MockLedger>, providers: ProviderRegistry) -> Session {
    let store = match ClientStore::temporary() {
        Ok(store) => store,
        Err(e) => panic!("temporary store: {}", e),
    };
    Session::new(store, Arc::new(mock_gateway(ledger)), providers)
}

/// `WalletProvider` over a local keypair
pub struct ScriptedProvider {
    kind: WalletKind,
    keypair: Keypair,
    connected: AtomicBool,
    withhold_public_key: bool,
    reject_connect: AtomicBool,
    reject_signing: AtomicBool,
    withhold_signature: AtomicBool,
    connect_calls: AtomicUsize,
    sign_calls: AtomicUsize,
    events: broadcast::Sender<ProviderEvent>,
}

impl ScriptedProvider {
    pub fn new(kind: WalletKind) -> Self {
        Self::with_keypair(kind, Keypair::new())
    }

    pub fn with_keypair(kind: WalletKind, keypair: Keypair) -> Self {
        let (events, _) = broadcast::channel(16);
        Self {
            kind,
            keypair,
            connected: AtomicBool::new(false),
            withhold_public_key: false,
            reject_connect: AtomicBool::new(false),
            reject_signing: AtomicBool::new(false),
            withhold_signature: AtomicBool::new(false),
            connect_calls: AtomicUsize::new(0),
            sign_calls: AtomicUsize::new(0),
            events,
        }
    }

    /// Connects, but reports no public key
    pub fn withholding_public_key(mut self) -> Self {
        self.withhold_public_key = true;
        self
    }

    pub fn rejecting_connect(self) -> Self {
        self.reject_connect.store(true, Ordering::SeqCst);
        self
    }

    /// Every signature request is rejected by the user
    pub fn set_reject_signing(&self, reject: bool) {
        self.reject_signing.store(reject, Ordering::SeqCst);
    }

    /// Return transactions unsigned
    pub fn set_withhold_signature(&self, withhold: bool) {
        self.withhold_signature.store(withhold, Ordering::SeqCst);
    }

    pub fn pubkey(&self) -> Pubkey {
        self.keypair.pubkey()
    }

    pub fn connect_calls(&self) -> usize {
        self.connect_calls.load(Ordering::SeqCst)
    }

    pub fn sign_calls(&self) -> usize {
        self.sign_calls.load(Ordering::SeqCst)
    }

    /// The user disconnected from inside the provider
    pub fn simulate_disconnect(&self) {
        self.connected.store(false, Ordering::SeqCst);
        let _ = self.events.send(ProviderEvent::Disconnected);
    }

    fn sign(&self, mut tx: Transaction) -> Result<Transaction, WalletError> {
        self.sign_calls.fetch_add(1, Ordering::SeqCst);
        if self.reject_signing.load(Ordering::SeqCst) {
            return Err(WalletError::UserRejected(self.kind.to_string()));
        }
        if self.withhold_signature.load(Ordering::SeqCst) {
            return Ok(tx);
        }
        let blockhash = tx.message.recent_blockhash;
        tx.try_partial_sign(&[&self.keypair], blockhash)
            .map_err(|e| WalletError::Signing(e.to_string()))?;
        Ok(tx)
    }
}

#[async_trait]
impl WalletProvider for ScriptedProvider {
    fn kind(&self) -> WalletKind {
        self.kind
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn public_key(&self) -> Option<Pubkey> {
        if self.withhold_public_key || !self.is_connected() {
            None
        } else {
            Some(self.keypair.pubkey())
        }
    }

    async fn connect(&self) -> Result<(), WalletError> {
        self.connect_calls.fetch_add(1, Ordering::SeqCst);
        if self.reject_connect.load(Ordering::SeqCst) {
            return Err(WalletError::UserRejected(self.kind.to_string()));
        }
        self.connected.store(true, Ordering::SeqCst);
        let _ = self.events.send(ProviderEvent::Connected(self.keypair.pubkey()));
        Ok(())
    }

    async fn sign_transaction(&self, tx: Transaction) -> Result<Transaction, WalletError> {
        self.sign(tx)
    }

    async fn sign_all_transactions(
        &self,
        txs: Vec<Transaction>,
    ) -> Result<Vec<Transaction>, WalletError> {
        txs.into_iter().map(|tx| self.sign(tx)).collect()
    }

    fn subscribe(&self) -> Option<broadcast::Receiver<ProviderEvent>> {
        Some(self.events.subscribe())
    }
}
