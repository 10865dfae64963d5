//! Scheduled-Transaction Primitives
//!
//! This crate provides the pure building blocks of the Tessera scheduled-transaction
//! subsystem:
//!
//! - **`ScheduleKey`**: the recursive key structure (simple / threshold-of-N / all-of list)
//!   together with the activation engine that decides whether a set of collected
//!   signatures satisfies it.
//! - **Collaborator traits**: `LedgerInspector`, `ScheduledCallInspector` and
//!   `ScheduledExecutor`, implemented at the runtime level and consumed by
//!   `pallet-scheduled-transactions`.
//!
//! ## Architecture
//!
//! The scheduler is a replicated deterministic state machine: every node must reach
//! the identical trigger/expire decision from the same consensus-ordered input. The
//! traits here exist so that the pallet never reaches into account or token state
//! directly; the runtime wires them up, which also breaks the dependency cycle
//! between the scheduling pallet and the pallets whose calls it defers.
//!
//! Everything in this crate is side-effect free. Activation is evaluated bottom-up
//! over the key structure and is total: it terminates for every well-formed key and
//! never consults anything beyond the supplied signature predicate.

#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

use alloc::vec::Vec;
use codec::{Decode, DecodeWithMemTracking, Encode, MaxEncodedLen};
use scale_info::TypeInfo;
use sp_runtime::{DispatchResult, RuntimeDebug};

/// A (possibly nested) signing requirement.
///
/// Keys form an arbitrarily deep tree. A `Simple` leaf holds raw public-key bytes;
/// a `Threshold` node is satisfied when at least `threshold` of its children are;
/// a `KeyList` node requires all of its children.
///
/// Modeled as a sum type with an explicit recursive evaluator rather than trait
/// objects, so evaluation is total and involves no dynamic dispatch.
#[derive(Encode, Decode, Clone, PartialEq, Eq, TypeInfo, RuntimeDebug)]
pub enum ScheduleKey {
	/// A single public key, identified by its raw bytes.
	Simple(Vec<u8>),
	/// Satisfied when at least `threshold` of `keys` are satisfied.
	Threshold { threshold: u32, keys: Vec<ScheduleKey> },
	/// Satisfied only when every contained key is satisfied.
	KeyList(Vec<ScheduleKey>),
}

impl ScheduleKey {
	/// Evaluate this key structure against a signature test predicate.
	///
	/// `is_signed` receives the raw bytes of a simple key and reports whether a
	/// valid signature for it has been collected. The predicate is the caller's
	/// policy: the scheduler passes a closure over a schedule's collected
	/// signature prefixes, or over a single request's own signatures when gating
	/// an admin-key operation.
	pub fn is_active<F>(&self, is_signed: &F) -> bool
	where
		F: Fn(&[u8]) -> bool,
	{
		match self {
			ScheduleKey::Simple(bytes) => is_signed(bytes),
			ScheduleKey::Threshold { threshold, keys } => {
				// Count satisfied children; short-circuit once the threshold is met.
				let mut active: u32 = 0;
				for key in keys {
					if key.is_active(is_signed) {
						active = active.saturating_add(1);
						if active >= *threshold {
							return true;
						}
					}
				}
				active >= *threshold
			},
			ScheduleKey::KeyList(keys) => keys.iter().all(|key| key.is_active(is_signed)),
		}
	}

	/// Whether an offered signature prefix signs for at least one simple key
	/// anywhere in this structure.
	///
	/// Used to distinguish "invalid signature" (matches nothing currently
	/// relevant) from "valid but already counted".
	pub fn matches_prefix(&self, prefix: &[u8]) -> bool {
		match self {
			ScheduleKey::Simple(bytes) => prefix_signs(prefix, bytes),
			ScheduleKey::Threshold { keys, .. } | ScheduleKey::KeyList(keys) =>
				keys.iter().any(|key| key.matches_prefix(prefix)),
		}
	}

	/// Structural validity: non-empty simple keys, thresholds within
	/// `1..=keys.len()`, no empty composite nodes, recursively.
	///
	/// An invalid structure could otherwise be trivially active (an empty
	/// `KeyList`) or permanently inert (a threshold above its child count), so
	/// admin keys are validated at schedule creation.
	pub fn is_valid_structure(&self) -> bool {
		match self {
			ScheduleKey::Simple(bytes) => !bytes.is_empty(),
			ScheduleKey::Threshold { threshold, keys } =>
				*threshold >= 1 &&
					(*threshold as usize) <= keys.len() &&
					keys.iter().all(|key| key.is_valid_structure()),
			ScheduleKey::KeyList(keys) =>
				!keys.is_empty() && keys.iter().all(|key| key.is_valid_structure()),
		}
	}
}

/// Whether `prefix` counts as a signature for the public key `key_bytes`.
///
/// Signatures are tracked as byte prefixes of the public keys that produced
/// them. Matching is prefix-aware rather than key-identity-aware: two distinct
/// keys may legitimately share a prefix, and one offered signature satisfies
/// every simple key it is a prefix of. Empty prefixes never sign anything.
pub fn prefix_signs(prefix: &[u8], key_bytes: &[u8]) -> bool {
	!prefix.is_empty() && key_bytes.starts_with(prefix)
}

/// The type tag of a scheduled transaction body.
///
/// The scheduler only ever inspects this tag (for the whitelist and for the
/// categorical nesting prohibition); interpreting the body is the executor's
/// business.
#[derive(Encode, Decode, MaxEncodedLen, Clone, Copy, PartialEq, Eq, TypeInfo, RuntimeDebug)]
pub enum ScheduledFunction {
	Transfer,
	TokenMint,
	TokenBurn,
	SubmitMessage,
	ContractCall,
	ScheduleCreate,
	ScheduleSign,
	ScheduleDelete,
}

impl ScheduledFunction {
	/// Schedules must never wrap schedule operations, independent of whatever
	/// the whitelist says.
	pub fn is_schedule_operation(&self) -> bool {
		matches!(
			self,
			ScheduledFunction::ScheduleCreate |
				ScheduledFunction::ScheduleSign |
				ScheduledFunction::ScheduleDelete
		)
	}
}

/// Accounts a scheduled body requires signatures from, as resolved by the
/// runtime's call inspector.
///
/// `receivers` contribute a required key only while their
/// receiver-signature-required flag is set, which is why they are reported
/// separately: the flag is re-read on every activation test.
#[derive(Encode, Decode, Clone, PartialEq, Eq, TypeInfo, RuntimeDebug)]
pub struct TransactionParties<AccountId> {
	pub required_signers: Vec<AccountId>,
	pub receivers: Vec<AccountId>,
}

/// The transaction id under which a schedule's deferred body executes.
///
/// Derived from the creating transaction (same payer, same valid-start) with the
/// `scheduled` flag set and a zero nonce, so callers can pre-compute the id of
/// the eventual record before the schedule fires.
#[derive(Encode, Decode, DecodeWithMemTracking, MaxEncodedLen, Clone, PartialEq, Eq, TypeInfo, RuntimeDebug)]
pub struct ScheduledTxId<AccountId, Moment> {
	pub payer: AccountId,
	pub valid_start: Moment,
	pub scheduled: bool,
	pub nonce: u32,
}

/// Read-only view of ledger account state, as of the current consensus-ordered
/// position (never a stale snapshot).
///
/// Implemented at the runtime level; the scheduler re-resolves required keys
/// through this trait on every activation test, because account keys,
/// receiver-signature flags and account existence can all change between the
/// moment a signature is offered and the moment a schedule is decided.
pub trait LedgerInspector<AccountId> {
	fn account_exists(who: &AccountId) -> bool;
	fn account_deleted(who: &AccountId) -> bool;
	fn account_key(who: &AccountId) -> Option<ScheduleKey>;
	fn receiver_sig_required(who: &AccountId) -> bool;
}

/// Structural inspection of a serialized scheduled body.
pub trait ScheduledCallInspector<AccountId> {
	/// Parse the body far enough to name its transaction type.
	/// `None` means the bytes are not a recognized transaction.
	fn classify(body: &[u8]) -> Option<ScheduledFunction>;

	/// The accounts whose signatures the body requires. `None` when the body
	/// parses but its signer set cannot be resolved.
	fn transaction_parties(body: &[u8]) -> Option<TransactionParties<AccountId>>;
}

/// The deferred business logic: invoked exactly once when a schedule fires.
///
/// The scheduler records the returned result in the execution record and never
/// interprets it beyond pass/fail; a failed execution is final and is never
/// retried or rolled back.
pub trait ScheduledExecutor<AccountId, Moment> {
	fn execute(body: &[u8], payer: &AccountId, consensus_time: Moment) -> DispatchResult;
}
