//! Mock runtime for testing pallet-scheduled-transactions.
//!
//! The external collaborators (ledger inspector, call inspector, executor) are
//! thread-local mocks so each test can shape account keys, receiver-signature
//! flags and deletions independently of the balances pallet.

use core::cell::RefCell;
use std::collections::BTreeMap;

use crate as pallet_scheduled_transactions;
use codec::{Decode, DecodeAll, Encode};
use frame_support::{
	derive_impl, parameter_types,
	traits::{Contains, Currency, ExistenceRequirement, Time, WithdrawReasons},
};
use sp_runtime::{BuildStorage, DispatchError, DispatchResult, TokenError};
use tp_scheduled::{
	LedgerInspector, ScheduleKey, ScheduledCallInspector, ScheduledExecutor, ScheduledFunction,
	TransactionParties,
};

type Block = frame_system::mocking::MockBlock<Test>;
pub type Balance = u128;
pub type AccountId = u64;
pub type Moment = u64;

/// Consensus time at which every test starts.
pub const INITIAL_TIME: Moment = 1_000;

/// Flat fee the mock executor charges the designated payer.
pub const EXECUTION_FEE: Balance = 10;

#[frame_support::runtime]
mod runtime {
	use super::*;

	#[runtime::runtime]
	#[runtime::derive(
		RuntimeCall,
		RuntimeEvent,
		RuntimeError,
		RuntimeOrigin,
		RuntimeFreezeReason,
		RuntimeHoldReason,
		RuntimeSlashReason,
		RuntimeLockId,
		RuntimeTask
	)]
	pub struct Test;

	#[runtime::pallet_index(0)]
	pub type System = frame_system::Pallet<Test>;

	#[runtime::pallet_index(1)]
	pub type Balances = pallet_balances::Pallet<Test>;

	#[runtime::pallet_index(2)]
	pub type ScheduledTransactions = pallet_scheduled_transactions::Pallet<Test>;
}

#[derive_impl(frame_system::config_preludes::TestDefaultConfig)]
impl frame_system::Config for Test {
	type Block = Block;
	type AccountId = AccountId;
	type Lookup = sp_runtime::traits::IdentityLookup<Self::AccountId>;
	type AccountData = pallet_balances::AccountData<Balance>;
}

#[derive_impl(pallet_balances::config_preludes::TestDefaultConfig)]
impl pallet_balances::Config for Test {
	type Balance = Balance;
	type ExistentialDeposit = sp_core::ConstU128<1>;
	type AccountStore = System;
}

thread_local! {
	static MOCKED_TIME: RefCell<Moment> = const { RefCell::new(INITIAL_TIME) };
	static ACCOUNTS: RefCell<BTreeMap<AccountId, MockAccount>> = RefCell::new(BTreeMap::new());
	static EXECUTIONS: RefCell<Vec<(AccountId, Moment)>> = const { RefCell::new(Vec::new()) };
}

/// Payer and consensus time of the most recent executor invocation.
pub fn last_execution() -> Option<(AccountId, Moment)> {
	EXECUTIONS.with(|log| log.borrow().last().copied())
}

#[derive(Clone)]
struct MockAccount {
	key: ScheduleKey,
	deleted: bool,
	receiver_sig_required: bool,
}

pub struct MockTimestamp;

impl MockTimestamp {
	pub fn set_timestamp(now: Moment) {
		MOCKED_TIME.with(|v| *v.borrow_mut() = now);
	}
}

impl Time for MockTimestamp {
	type Moment = Moment;
	fn now() -> Self::Moment {
		MOCKED_TIME.with(|v| *v.borrow())
	}
}

/// Register an account in the mock ledger with the given key.
pub fn register_account(who: AccountId, key: ScheduleKey) {
	ACCOUNTS.with(|accounts| {
		accounts
			.borrow_mut()
			.insert(who, MockAccount { key, deleted: false, receiver_sig_required: false });
	});
}

/// Rotate an existing account's key.
pub fn set_account_key(who: AccountId, key: ScheduleKey) {
	ACCOUNTS.with(|accounts| {
		if let Some(account) = accounts.borrow_mut().get_mut(&who) {
			account.key = key;
		}
	});
}

pub fn set_receiver_sig_required(who: AccountId, required: bool) {
	ACCOUNTS.with(|accounts| {
		if let Some(account) = accounts.borrow_mut().get_mut(&who) {
			account.receiver_sig_required = required;
		}
	});
}

pub fn mark_account_deleted(who: AccountId) {
	ACCOUNTS.with(|accounts| {
		if let Some(account) = accounts.borrow_mut().get_mut(&who) {
			account.deleted = true;
		}
	});
}

pub struct MockLedger;

impl LedgerInspector<AccountId> for MockLedger {
	fn account_exists(who: &AccountId) -> bool {
		ACCOUNTS.with(|accounts| accounts.borrow().contains_key(who))
	}

	fn account_deleted(who: &AccountId) -> bool {
		ACCOUNTS.with(|accounts| accounts.borrow().get(who).is_some_and(|a| a.deleted))
	}

	fn account_key(who: &AccountId) -> Option<ScheduleKey> {
		ACCOUNTS.with(|accounts| accounts.borrow().get(who).map(|a| a.key.clone()))
	}

	fn receiver_sig_required(who: &AccountId) -> bool {
		ACCOUNTS
			.with(|accounts| accounts.borrow().get(who).is_some_and(|a| a.receiver_sig_required))
	}
}

/// The transaction bodies the mock runtime knows how to schedule.
#[derive(Encode, Decode, Clone, PartialEq, Eq, Debug)]
pub enum MockScheduledCall {
	Transfer { from: AccountId, to: AccountId, amount: Balance },
	Remark(Vec<u8>),
	MintToken { amount: Balance },
	ContractCall,
	ScheduleCreate,
	ScheduleSign,
	ScheduleDelete,
}

pub struct MockCallInspector;

impl ScheduledCallInspector<AccountId> for MockCallInspector {
	fn classify(body: &[u8]) -> Option<ScheduledFunction> {
		let call = MockScheduledCall::decode_all(&mut &*body).ok()?;
		Some(match call {
			MockScheduledCall::Transfer { .. } => ScheduledFunction::Transfer,
			MockScheduledCall::Remark(_) => ScheduledFunction::SubmitMessage,
			MockScheduledCall::MintToken { .. } => ScheduledFunction::TokenMint,
			MockScheduledCall::ContractCall => ScheduledFunction::ContractCall,
			MockScheduledCall::ScheduleCreate => ScheduledFunction::ScheduleCreate,
			MockScheduledCall::ScheduleSign => ScheduledFunction::ScheduleSign,
			MockScheduledCall::ScheduleDelete => ScheduledFunction::ScheduleDelete,
		})
	}

	fn transaction_parties(body: &[u8]) -> Option<TransactionParties<AccountId>> {
		let call = MockScheduledCall::decode_all(&mut &*body).ok()?;
		Some(match call {
			MockScheduledCall::Transfer { from, to, .. } =>
				TransactionParties { required_signers: vec![from], receivers: vec![to] },
			_ => TransactionParties { required_signers: vec![], receivers: vec![] },
		})
	}
}

/// Executes scheduled bodies against the balances pallet. Charges the payer a
/// flat fee first, so an insolvent designated payer produces a failing record
/// with no transfers.
pub struct MockExecutor;

impl ScheduledExecutor<AccountId, Moment> for MockExecutor {
	fn execute(body: &[u8], payer: &AccountId, consensus_time: Moment) -> DispatchResult {
		EXECUTIONS.with(|log| log.borrow_mut().push((*payer, consensus_time)));
		let call = MockScheduledCall::decode_all(&mut &*body)
			.map_err(|_| DispatchError::Other("unparseable scheduled body"))?;
		if Balances::free_balance(payer) < EXECUTION_FEE {
			return Err(TokenError::FundsUnavailable.into());
		}
		<Balances as Currency<AccountId>>::withdraw(
			payer,
			EXECUTION_FEE,
			WithdrawReasons::FEE,
			ExistenceRequirement::AllowDeath,
		)?;
		match call {
			MockScheduledCall::Transfer { from, to, amount } =>
				<Balances as Currency<AccountId>>::transfer(
					&from,
					&to,
					amount,
					ExistenceRequirement::AllowDeath,
				),
			MockScheduledCall::Remark(_) | MockScheduledCall::MintToken { .. } => Ok(()),
			_ => Err(DispatchError::Other("not an executable mock call")),
		}
	}
}

pub struct MockWhitelist;

impl Contains<ScheduledFunction> for MockWhitelist {
	fn contains(function: &ScheduledFunction) -> bool {
		matches!(
			function,
			ScheduledFunction::Transfer |
				ScheduledFunction::SubmitMessage |
				ScheduledFunction::TokenMint
		)
	}
}

parameter_types! {
	pub const MaxBodySize: u32 = 1024;
	pub const MaxMemoLength: u32 = 100;
	pub const MaxKeySize: u32 = 512;
	pub const MaxSignatories: u32 = 32;
	pub const MaxSignatureLength: u32 = 64;
	pub const DefaultExpiry: Moment = 1800;
	pub const MaxExpiry: Moment = 5_356_800;
	pub const ExpiryBucketSize: Moment = 1;
	pub const MaxSchedulesPerBucket: u32 = 16;
	pub const MaxExpiryBuckets: u32 = 128;
	pub storage LongTermEnabled: bool = true;
}

impl pallet_scheduled_transactions::Config for Test {
	type TimeProvider = MockTimestamp;
	type Ledger = MockLedger;
	type CallInspector = MockCallInspector;
	type Executor = MockExecutor;
	type ScheduleWhitelist = MockWhitelist;
	type MaxBodySize = MaxBodySize;
	type MaxMemoLength = MaxMemoLength;
	type MaxKeySize = MaxKeySize;
	type MaxSignatories = MaxSignatories;
	type MaxSignatureLength = MaxSignatureLength;
	type DefaultExpiry = DefaultExpiry;
	type MaxExpiry = MaxExpiry;
	type LongTermEnabled = LongTermEnabled;
	type ExpiryBucketSize = ExpiryBucketSize;
	type MaxSchedulesPerBucket = MaxSchedulesPerBucket;
	type MaxExpiryBuckets = MaxExpiryBuckets;
	type WeightInfo = ();
}

pub fn new_test_ext() -> sp_io::TestExternalities {
	MOCKED_TIME.with(|v| *v.borrow_mut() = INITIAL_TIME);
	ACCOUNTS.with(|accounts| accounts.borrow_mut().clear());
	EXECUTIONS.with(|log| log.borrow_mut().clear());

	let mut t = frame_system::GenesisConfig::<Test>::default().build_storage().unwrap();

	pallet_balances::GenesisConfig::<Test> {
		balances: vec![
			(1, 100_000),
			(2, 200_000),
			(3, 300_000),
			(4, 400_000),
			(5, 500_000),
		],
		..Default::default()
	}
	.assimilate_storage(&mut t)
	.unwrap();

	let mut ext: sp_io::TestExternalities = t.into();
	ext.execute_with(|| {
		System::set_block_number(1);
		// Ledger accounts 1..=6 exist with single-byte-patterned simple keys;
		// account 6 carries no balance so it can play the insolvent payer.
		for who in 1u64..=6 {
			register_account(who, ScheduleKey::Simple(vec![who as u8; 32]));
		}
	});
	ext
}
