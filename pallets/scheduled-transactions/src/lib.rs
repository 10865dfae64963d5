//! # Tessera Scheduled Transactions Pallet
//!
//! This pallet lets an account register a transaction now for execution later, once
//! either a signing threshold over the transaction's required signers is satisfied or
//! a consensus-time expiration is reached.
//!
//! ## Features
//!
//! - Create schedules wrapping a whitelisted transaction body, with optional explicit
//!   payer, optional admin key (absent means the schedule is immutable) and a memo
//! - Deduplication: identical creation requests (body + payer + admin key + memo)
//!   resolve to the existing schedule instead of a new entity
//! - Sign schedules with additional signature prefixes; activation is re-evaluated
//!   against the *current* ledger key structures on every event
//! - Eager execution the moment the required signers are satisfied, or deferred
//!   execution at the expiration time under `wait_for_expiry`
//! - Per-block expiry sweep driving deterministic execute-or-expire decisions
//! - Admin-key gated deletion before a terminal state is reached
//!
//! ## Determinism
//!
//! The whole pallet is a replicated deterministic state machine: all decisions are
//! made on the single-threaded, consensus-ordered dispatch path, the expiration
//! index is scanned in bucket order then insertion order, and required signer keys
//! are always re-resolved from current ledger state rather than cached. Business
//! logic of the deferred transaction itself lives behind the
//! [`tp_scheduled::ScheduledExecutor`] collaborator; its failure is recorded in the
//! execution record and never unwinds the scheduling state.

#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;
use alloc::vec::Vec;
pub use pallet::*;
pub use weights::*;

#[cfg(test)]
mod mock;


pub mod weights;

use codec::{Decode, Encode, MaxEncodedLen};
use frame_support::BoundedVec;
use scale_info::TypeInfo;
use sp_runtime::RuntimeDebug;
use tp_scheduled::ScheduledFunction;

pub const LOG_TARGET: &str = "runtime::scheduled-transactions";

/// Lifecycle state of a schedule, derived from its terminal timestamps.
#[derive(Encode, Decode, MaxEncodedLen, Clone, Copy, TypeInfo, RuntimeDebug, PartialEq, Eq)]
pub enum ScheduleStatus {
	/// Awaiting signatures and/or expiration.
	Pending,
	/// The deferred transaction was handed to the executor.
	Executed,
	/// Deleted via the admin key before execution.
	Deleted,
}

/// A stored schedule.
///
/// The creation fields (`payer`, `body`, `admin_key`, `memo`) are immutable after
/// creation and participate in the dedup fingerprint. `signatories` only ever
/// grows; `executed_at` and `deleted_at` are mutually exclusive one-way latches.
#[derive(Encode, Decode, MaxEncodedLen, Clone, TypeInfo, RuntimeDebug, PartialEq, Eq)]
pub struct Schedule<AccountId, Moment, Hash, BoundedBody, BoundedKey, BoundedMemo, BoundedSignatories>
{
	/// Account that created the schedule.
	pub creator: AccountId,
	/// Explicitly designated payer for the deferred transaction; the creator
	/// pays when absent.
	pub payer: Option<AccountId>,
	/// Serialized body of the deferred transaction.
	pub body: BoundedBody,
	/// Type tag of the body, cached from admission (re-derivable from `body`).
	pub function: ScheduledFunction,
	/// Encoded admin key; `None` means the schedule cannot be deleted.
	pub admin_key: Option<BoundedKey>,
	/// Creator-supplied memo.
	pub memo: BoundedMemo,
	/// When set, sufficient signatures only mark the schedule ready; execution
	/// happens at the expiration sweep.
	pub wait_for_expiry: bool,
	/// Consensus time at which the schedule expires (or executes, under
	/// `wait_for_expiry`).
	pub expiration_time: Moment,
	/// Consensus time of the creating transaction; the valid-start of the
	/// scheduled transaction id.
	pub created_at: Moment,
	/// Collected signature prefixes, in collection order. Grows monotonically.
	pub signatories: BoundedSignatories,
	/// Consensus time of execution, if any.
	pub executed_at: Option<Moment>,
	/// Consensus time of deletion, if any.
	pub deleted_at: Option<Moment>,
	/// Dedup fingerprint over the immutable creation fields, kept for index
	/// cleanup on terminal transitions.
	pub fingerprint: Hash,
}

impl<AccountId, Moment, Hash, BoundedBody, BoundedKey, BoundedMemo, BoundedSignatories>
	Schedule<AccountId, Moment, Hash, BoundedBody, BoundedKey, BoundedMemo, BoundedSignatories>
{
	/// The account that pays for the deferred transaction.
	pub fn payer_account(&self) -> &AccountId {
		self.payer.as_ref().unwrap_or(&self.creator)
	}

	pub fn status(&self) -> ScheduleStatus {
		if self.deleted_at.is_some() {
			ScheduleStatus::Deleted
		} else if self.executed_at.is_some() {
			ScheduleStatus::Executed
		} else {
			ScheduleStatus::Pending
		}
	}
}

#[frame_support::pallet]
pub mod pallet {
	use super::*;
	use codec::DecodeAll;
	use frame_support::{
		pallet_prelude::*,
		traits::{Contains, Time},
	};
	use frame_system::pallet_prelude::*;
	use sp_runtime::traits::{Hash as HashT, One, Saturating, Zero};
	use tp_scheduled::{
		prefix_signs, LedgerInspector, ScheduleKey, ScheduledCallInspector, ScheduledExecutor,
		ScheduledTxId,
	};

	#[pallet::pallet]
	pub struct Pallet<T>(_);

	#[pallet::config]
	pub trait Config: frame_system::Config<RuntimeEvent: From<Event<Self>>> {
		/// Consensus time source. Every activation and expiry decision is made
		/// against this clock, never against wall-clock time.
		type TimeProvider: Time;

		/// Current-state account inspection (existence, keys, receiver-sig
		/// flags), implemented by the runtime.
		type Ledger: LedgerInspector<Self::AccountId>;

		/// Structural inspection of scheduled bodies (type tag, required
		/// signer accounts), implemented by the runtime.
		type CallInspector: ScheduledCallInspector<Self::AccountId>;

		/// The business logic invoked when a schedule fires.
		type Executor: ScheduledExecutor<Self::AccountId, MomentOf<Self>>;

		/// The set of transaction types that may be scheduled.
		type ScheduleWhitelist: Contains<ScheduledFunction>;

		/// Maximum size of a serialized scheduled body.
		#[pallet::constant]
		type MaxBodySize: Get<u32>;

		/// Maximum memo length in bytes.
		#[pallet::constant]
		type MaxMemoLength: Get<u32>;

		/// Maximum size of an encoded admin key.
		#[pallet::constant]
		type MaxKeySize: Get<u32>;

		/// Maximum number of collected signature prefixes per schedule.
		#[pallet::constant]
		type MaxSignatories: Get<u32>;

		/// Maximum length of a single signature prefix.
		#[pallet::constant]
		type MaxSignatureLength: Get<u32>;

		/// Expiration applied when a creation request carries no explicit
		/// expiration time.
		#[pallet::constant]
		type DefaultExpiry: Get<MomentOf<Self>>;

		/// Furthest into the future an explicit expiration may lie.
		#[pallet::constant]
		type MaxExpiry: Get<MomentOf<Self>>;

		/// Whether long-term scheduling (`wait_for_expiry`, explicit
		/// expirations) is enabled.
		#[pallet::constant]
		type LongTermEnabled: Get<bool>;

		/// Granularity of the expiration index. Expirations are rounded up to
		/// the next bucket boundary, so a bucket is due once consensus time
		/// reaches its key.
		#[pallet::constant]
		type ExpiryBucketSize: Get<MomentOf<Self>>;

		/// Maximum number of schedules sharing one expiration bucket.
		#[pallet::constant]
		type MaxSchedulesPerBucket: Get<u32>;

		/// Maximum number of outstanding expiration buckets.
		#[pallet::constant]
		type MaxExpiryBuckets: Get<u32>;

		/// Weight information for extrinsics.
		type WeightInfo: WeightInfo;
	}

	/// Consensus time unit.
	pub type MomentOf<T> = <<T as Config>::TimeProvider as Time>::Moment;

	/// Type alias for bounded scheduled body bytes.
	pub type BoundedBodyOf<T> = BoundedVec<u8, <T as Config>::MaxBodySize>;

	/// Type alias for bounded memo bytes.
	pub type BoundedMemoOf<T> = BoundedVec<u8, <T as Config>::MaxMemoLength>;

	/// Type alias for bounded encoded admin keys.
	pub type BoundedKeyOf<T> = BoundedVec<u8, <T as Config>::MaxKeySize>;

	/// Type alias for a single bounded signature prefix.
	pub type SignatureOf<T> = BoundedVec<u8, <T as Config>::MaxSignatureLength>;

	/// Type alias for the collected signatory set of one schedule.
	pub type BoundedSignatoriesOf<T> =
		BoundedVec<SignatureOf<T>, <T as Config>::MaxSignatories>;

	/// Type alias for a fully bound schedule.
	pub type ScheduleOf<T> = Schedule<
		<T as frame_system::Config>::AccountId,
		MomentOf<T>,
		<T as frame_system::Config>::Hash,
		BoundedBodyOf<T>,
		BoundedKeyOf<T>,
		BoundedMemoOf<T>,
		BoundedSignatoriesOf<T>,
	>;

	/// Primary map: all live schedule records, including executed/deleted ones
	/// retained for the query surface until their purge bucket is swept.
	#[pallet::storage]
	#[pallet::getter(fn schedules)]
	pub type Schedules<T: Config> =
		StorageMap<_, Blake2_128Concat, u64, ScheduleOf<T>, OptionQuery>;

	/// Monotonically assigned schedule ids.
	#[pallet::storage]
	pub type NextScheduleId<T: Config> = StorageValue<_, u64, ValueQuery>;

	/// Dedup index: fingerprint of the immutable creation fields to schedule id.
	/// An entry exists exactly while the schedule is pending.
	#[pallet::storage]
	pub type ScheduleFingerprints<T: Config> =
		StorageMap<_, Blake2_128Concat, T::Hash, u64, OptionQuery>;

	/// Expiration index: bucket boundary to the pending schedules expiring in
	/// that bucket, in creation order.
	#[pallet::storage]
	pub type ExpiryBuckets<T: Config> = StorageMap<
		_,
		Blake2_128Concat,
		MomentOf<T>,
		BoundedVec<u64, T::MaxSchedulesPerBucket>,
		ValueQuery,
	>;

	/// Executed/deleted records awaiting purge from the primary map. Terminal
	/// schedules leave the expiration index immediately and are parked here so
	/// the sweep never re-decides them.
	#[pallet::storage]
	pub type RetiredBuckets<T: Config> = StorageMap<
		_,
		Blake2_128Concat,
		MomentOf<T>,
		BoundedVec<u64, T::MaxSchedulesPerBucket>,
		ValueQuery,
	>;

	/// Sorted list of bucket boundaries with outstanding entries, so the sweep
	/// visits only live buckets.
	#[pallet::storage]
	pub type ExpiryBucketQueue<T: Config> =
		StorageValue<_, BoundedVec<MomentOf<T>, T::MaxExpiryBuckets>, ValueQuery>;

	#[pallet::event]
	#[pallet::generate_deposit(pub(super) fn deposit_event)]
	pub enum Event<T: Config> {
		/// A new schedule was admitted.
		ScheduleCreated {
			schedule_id: u64,
			creator: T::AccountId,
			payer: T::AccountId,
			expiration_time: MomentOf<T>,
			wait_for_expiry: bool,
		},
		/// A creation request matched an existing schedule's fingerprint and was
		/// merged into it instead of creating a new entity.
		ScheduleMatched { schedule_id: u64, creator: T::AccountId },
		/// New valid signatures were collected.
		ScheduleSigned { schedule_id: u64, signatory_count: u32 },
		/// The schedule fired. `result` is whatever the executor reported for the
		/// deferred body; a failure here is final and charges nothing further.
		ScheduleExecuted {
			schedule_id: u64,
			scheduled_tx_id: ScheduledTxId<T::AccountId, MomentOf<T>>,
			result: DispatchResult,
		},
		/// The schedule was deleted via its admin key.
		ScheduleDeleted { schedule_id: u64 },
		/// The schedule reached its expiration without the required signatures
		/// and was discarded without execution.
		ScheduleExpired { schedule_id: u64 },
	}

	#[pallet::error]
	pub enum Error<T> {
		/// Scheduled body exceeds `MaxBodySize`.
		BodyTooLarge,
		/// Scheduled body does not parse into a recognized transaction type.
		UnparseableScheduledBody,
		/// Scheduled body is itself a schedule operation.
		NestedScheduleNotAllowed,
		/// Scheduled body's transaction type is not whitelisted.
		FunctionNotSchedulable,
		/// Memo exceeds `MaxMemoLength`.
		MemoTooLong,
		/// Admin key does not decode into a structurally valid key.
		InvalidAdminKey,
		/// `wait_for_expiry` / explicit expirations require long-term
		/// scheduling to be enabled.
		LongTermSchedulingDisabled,
		/// Explicit expiration is not in the future.
		ExpirationInPast,
		/// Explicit expiration exceeds `MaxExpiry` from now.
		ExpirationTooFar,
		/// Designated payer account does not exist.
		PayerAccountNotFound,
		/// An account the body requires signatures from cannot be resolved.
		UnresolvableRequiredSigners,
		/// No such schedule (unknown id, or already terminal and purged).
		InvalidScheduleId,
		/// Schedule already executed.
		AlreadyExecuted,
		/// Schedule already deleted.
		AlreadyDeleted,
		/// Schedule was created without an admin key and cannot be deleted.
		ScheduleIsImmutable,
		/// The deletion request's signatures do not satisfy the admin key.
		InvalidAdminSignature,
		/// The offered signatures added nothing new.
		NoNewValidSignatures,
		/// At least one offered signature matches no currently relevant key.
		SomeSignaturesInvalid,
		/// A signature prefix exceeds `MaxSignatureLength`.
		SignatureTooLong,
		/// The collected signatory set is full.
		TooManySignatories,
		/// Too many schedules share this expiration bucket.
		TooManySchedulesAtExpiry,
		/// Too many outstanding expiration buckets.
		TooManyPendingBuckets,
	}

	#[pallet::hooks]
	impl<T: Config> Hooks<BlockNumberFor<T>> for Pallet<T> {
		/// Run the expiry sweep once per consensus round, whether or not any
		/// user request arrived in it, so pure-expiry transitions happen
		/// deterministically on every node.
		fn on_initialize(_n: BlockNumberFor<T>) -> Weight {
			Self::do_sweep(T::TimeProvider::now())
		}
	}

	#[pallet::call]
	impl<T: Config> Pallet<T> {
		/// Register a transaction for deferred execution.
		///
		/// Admission runs the validity gate (structural checks before ledger
		/// lookups) and then resolves deduplication: a request whose body,
		/// payer, admin key and memo byte-match an existing pending schedule
		/// merges its signatures into that schedule instead of creating a new
		/// one. Offered `signatures` are prefixes of the public keys that
		/// validly signed the request, as verified upstream.
		///
		/// Without long-term scheduling, the expiration defaults to
		/// `DefaultExpiry` from now. With it, `expiration_time` may be set
		/// explicitly and `wait_for_expiry` defers execution to the sweep even
		/// once fully signed.
		#[pallet::call_index(0)]
		#[pallet::weight(<T as Config>::WeightInfo::create_schedule())]
		pub fn create_schedule(
			origin: OriginFor<T>,
			body: Vec<u8>,
			payer: Option<T::AccountId>,
			admin_key: Option<Vec<u8>>,
			memo: Vec<u8>,
			wait_for_expiry: bool,
			expiration_time: Option<MomentOf<T>>,
			signatures: Vec<Vec<u8>>,
		) -> DispatchResult {
			let creator = ensure_signed(origin)?;
			let now = T::TimeProvider::now();

			// Validity gate, cheap structural checks first. Body size before
			// anything touches the bytes.
			let bounded_body: BoundedBodyOf<T> =
				body.try_into().map_err(|_| Error::<T>::BodyTooLarge)?;
			let function = T::CallInspector::classify(bounded_body.as_slice())
				.ok_or(Error::<T>::UnparseableScheduledBody)?;
			// Nesting is categorically rejected, independent of the whitelist.
			ensure!(!function.is_schedule_operation(), Error::<T>::NestedScheduleNotAllowed);
			ensure!(
				T::ScheduleWhitelist::contains(&function),
				Error::<T>::FunctionNotSchedulable
			);
			let bounded_memo: BoundedMemoOf<T> =
				memo.try_into().map_err(|_| Error::<T>::MemoTooLong)?;
			let bounded_admin: Option<BoundedKeyOf<T>> = match admin_key {
				Some(bytes) => {
					let key = ScheduleKey::decode_all(&mut bytes.as_slice())
						.map_err(|_| Error::<T>::InvalidAdminKey)?;
					ensure!(key.is_valid_structure(), Error::<T>::InvalidAdminKey);
					Some(bytes.try_into().map_err(|_| Error::<T>::InvalidAdminKey)?)
				},
				None => None,
			};

			if wait_for_expiry || expiration_time.is_some() {
				ensure!(T::LongTermEnabled::get(), Error::<T>::LongTermSchedulingDisabled);
			}
			let expiration = match expiration_time {
				Some(at) => {
					ensure!(at > now, Error::<T>::ExpirationInPast);
					ensure!(
						at <= now.saturating_add(T::MaxExpiry::get()),
						Error::<T>::ExpirationTooFar
					);
					at
				},
				None => now.saturating_add(T::DefaultExpiry::get()),
			};

			// Ledger-state checks last.
			let payer_account = payer.clone().unwrap_or_else(|| creator.clone());
			ensure!(
				T::Ledger::account_exists(&payer_account) &&
					!T::Ledger::account_deleted(&payer_account),
				Error::<T>::PayerAccountNotFound
			);
			let parties = T::CallInspector::transaction_parties(bounded_body.as_slice())
				.ok_or(Error::<T>::UnresolvableRequiredSigners)?;
			for who in parties.required_signers.iter().chain(parties.receivers.iter()) {
				ensure!(
					T::Ledger::account_exists(who) && !T::Ledger::account_deleted(who),
					Error::<T>::UnresolvableRequiredSigners
				);
			}

			let offered = Self::bound_signatures(signatures)?;
			let fingerprint =
				Self::fingerprint(&bounded_body, &payer, &bounded_admin, &bounded_memo);

			// Dedup: byte-identical creation fields resolve to the existing
			// schedule. Zero newly added signatures is not an error on the
			// creation path.
			if let Some(existing_id) = ScheduleFingerprints::<T>::get(fingerprint) {
				let mut schedule =
					Schedules::<T>::get(existing_id).ok_or(Error::<T>::InvalidScheduleId)?;
				let required = Self::required_keys(&schedule)?;
				let fresh =
					Self::classify_offered(&offered, &required, &schedule.signatories)?;
				for sig in fresh {
					schedule
						.signatories
						.try_push(sig)
						.map_err(|_| Error::<T>::TooManySignatories)?;
				}
				Schedules::<T>::insert(existing_id, &schedule);
				Self::deposit_event(Event::ScheduleMatched {
					schedule_id: existing_id,
					creator,
				});
				Self::maybe_trigger(existing_id, schedule, now);
				return Ok(());
			}

			let schedule_id = NextScheduleId::<T>::get();
			let mut schedule = Schedule {
				creator: creator.clone(),
				payer,
				body: bounded_body,
				function,
				admin_key: bounded_admin,
				memo: bounded_memo,
				wait_for_expiry,
				expiration_time: expiration,
				created_at: now,
				signatories: BoundedSignatoriesOf::<T>::default(),
				executed_at: None,
				deleted_at: None,
				fingerprint,
			};

			let required = Self::required_keys(&schedule)?;
			let fresh = Self::classify_offered(&offered, &required, &schedule.signatories)?;
			for sig in fresh {
				schedule.signatories.try_push(sig).map_err(|_| Error::<T>::TooManySignatories)?;
			}

			let bucket = Self::bucket_for(expiration);
			ExpiryBuckets::<T>::try_mutate(bucket, |ids| {
				ids.try_push(schedule_id).map_err(|_| Error::<T>::TooManySchedulesAtExpiry)
			})?;
			Self::enqueue_bucket(bucket)?;
			ScheduleFingerprints::<T>::insert(fingerprint, schedule_id);
			Schedules::<T>::insert(schedule_id, &schedule);
			NextScheduleId::<T>::put(schedule_id.saturating_add(1));

			Self::deposit_event(Event::ScheduleCreated {
				schedule_id,
				creator,
				payer: payer_account,
				expiration_time: expiration,
				wait_for_expiry,
			});

			Self::maybe_trigger(schedule_id, schedule, now);
			Ok(())
		}

		/// Offer additional signatures toward a pending schedule's activation.
		///
		/// The required signer set is recomputed against current ledger state;
		/// signatures collected under a since-rotated key never satisfy the new
		/// structure. A request whose signatures match nothing currently
		/// relevant fails with `SomeSignaturesInvalid`; one that adds nothing
		/// new fails with `NoNewValidSignatures`. Neither unwinds previously
		/// collected signatures.
		#[pallet::call_index(1)]
		#[pallet::weight(<T as Config>::WeightInfo::sign_schedule())]
		pub fn sign_schedule(
			origin: OriginFor<T>,
			schedule_id: u64,
			signatures: Vec<Vec<u8>>,
		) -> DispatchResult {
			let _who = ensure_signed(origin)?;
			let mut schedule =
				Schedules::<T>::get(schedule_id).ok_or(Error::<T>::InvalidScheduleId)?;
			ensure!(schedule.executed_at.is_none(), Error::<T>::AlreadyExecuted);
			ensure!(schedule.deleted_at.is_none(), Error::<T>::AlreadyDeleted);

			let offered = Self::bound_signatures(signatures)?;
			let required = Self::required_keys(&schedule)?;
			let fresh = Self::classify_offered(&offered, &required, &schedule.signatories)?;
			ensure!(!fresh.is_empty(), Error::<T>::NoNewValidSignatures);
			for sig in fresh {
				schedule.signatories.try_push(sig).map_err(|_| Error::<T>::TooManySignatories)?;
			}
			Schedules::<T>::insert(schedule_id, &schedule);
			Self::deposit_event(Event::ScheduleSigned {
				schedule_id,
				signatory_count: schedule.signatories.len() as u32,
			});

			Self::maybe_trigger(schedule_id, schedule, T::TimeProvider::now());
			Ok(())
		}

		/// Delete a pending schedule.
		///
		/// Permitted only when an admin key was set at creation and the
		/// request's own signatures satisfy it; the collected signatory set is
		/// never consulted here.
		#[pallet::call_index(2)]
		#[pallet::weight(<T as Config>::WeightInfo::delete_schedule())]
		pub fn delete_schedule(
			origin: OriginFor<T>,
			schedule_id: u64,
			signatures: Vec<Vec<u8>>,
		) -> DispatchResult {
			let _who = ensure_signed(origin)?;
			let mut schedule =
				Schedules::<T>::get(schedule_id).ok_or(Error::<T>::InvalidScheduleId)?;
			ensure!(schedule.executed_at.is_none(), Error::<T>::AlreadyExecuted);
			ensure!(schedule.deleted_at.is_none(), Error::<T>::AlreadyDeleted);
			let admin_bytes =
				schedule.admin_key.as_ref().ok_or(Error::<T>::ScheduleIsImmutable)?;
			let admin_key = ScheduleKey::decode_all(&mut admin_bytes.as_slice())
				.map_err(|_| Error::<T>::InvalidAdminKey)?;

			let offered = Self::bound_signatures(signatures)?;
			let signed =
				|key_bytes: &[u8]| offered.iter().any(|p| prefix_signs(p.as_slice(), key_bytes));
			ensure!(admin_key.is_active(&signed), Error::<T>::InvalidAdminSignature);

			let now = T::TimeProvider::now();
			schedule.deleted_at = Some(now);
			Schedules::<T>::insert(schedule_id, &schedule);
			Self::retire(schedule_id, &schedule, now);

			Self::deposit_event(Event::ScheduleDeleted { schedule_id });
			Ok(())
		}
	}

	impl<T: Config> Pallet<T> {
		/// Derived lifecycle state for the query surface.
		pub fn schedule_status(schedule_id: u64) -> Option<ScheduleStatus> {
			Schedules::<T>::get(schedule_id).map(|s| s.status())
		}

		/// The transaction id the schedule fires (or fired) under: same payer
		/// and valid-start as the creating transaction, `scheduled` set, zero
		/// nonce. Pre-computable by callers before the schedule triggers.
		pub fn scheduled_tx_id(
			schedule_id: u64,
		) -> Option<ScheduledTxId<T::AccountId, MomentOf<T>>> {
			Schedules::<T>::get(schedule_id).map(|s| ScheduledTxId {
				payer: s.payer_account().clone(),
				valid_start: s.created_at,
				scheduled: true,
				nonce: 0,
			})
		}

		/// Canonical identity of a candidate schedule: a hash over the exact
		/// bytes of the four immutable creation fields. Attached signatures and
		/// signatories deliberately do not participate.
		fn fingerprint(
			body: &BoundedBodyOf<T>,
			payer: &Option<T::AccountId>,
			admin_key: &Option<BoundedKeyOf<T>>,
			memo: &BoundedMemoOf<T>,
		) -> T::Hash {
			T::Hashing::hash_of(&(body, payer, admin_key, memo))
		}

		fn bound_signatures(
			signatures: Vec<Vec<u8>>,
		) -> Result<Vec<SignatureOf<T>>, Error<T>> {
			signatures
				.into_iter()
				.map(|sig| sig.try_into().map_err(|_| Error::<T>::SignatureTooLong))
				.collect()
		}

		/// Resolve the full required-signer key set against *current* ledger
		/// state: the payer's key, each required signer's key, and each
		/// receiver's key while its receiver-sig-required flag is set.
		///
		/// Never cached: keys can rotate, flags can flip and accounts can be
		/// deleted between events, and a schedule fully signed under an old
		/// structure must not be grandfathered.
		fn required_keys(schedule: &ScheduleOf<T>) -> Result<Vec<ScheduleKey>, Error<T>> {
			let mut keys = Vec::new();
			keys.push(Self::current_key(schedule.payer_account())?);
			let parties = T::CallInspector::transaction_parties(schedule.body.as_slice())
				.ok_or(Error::<T>::UnresolvableRequiredSigners)?;
			for who in &parties.required_signers {
				keys.push(Self::current_key(who)?);
			}
			for who in &parties.receivers {
				ensure!(
					T::Ledger::account_exists(who) && !T::Ledger::account_deleted(who),
					Error::<T>::UnresolvableRequiredSigners
				);
				if T::Ledger::receiver_sig_required(who) {
					keys.push(Self::current_key(who)?);
				}
			}
			Ok(keys)
		}

		fn current_key(who: &T::AccountId) -> Result<ScheduleKey, Error<T>> {
			ensure!(
				T::Ledger::account_exists(who) && !T::Ledger::account_deleted(who),
				Error::<T>::UnresolvableRequiredSigners
			);
			T::Ledger::account_key(who).ok_or(Error::<T>::UnresolvableRequiredSigners)
		}

		/// Split offered signatures into newly collected ones, rejecting any
		/// that match no currently relevant key. "Already counted" is decided
		/// by exact prefix bytes, not key identity, since distinct keys may
		/// share a prefix.
		fn classify_offered(
			offered: &[SignatureOf<T>],
			required: &[ScheduleKey],
			collected: &BoundedSignatoriesOf<T>,
		) -> Result<Vec<SignatureOf<T>>, Error<T>> {
			let mut fresh: Vec<SignatureOf<T>> = Vec::new();
			for sig in offered {
				let relevant = required.iter().any(|key| key.matches_prefix(sig.as_slice()));
				ensure!(relevant, Error::<T>::SomeSignaturesInvalid);
				let already = collected.iter().any(|c| c.as_slice() == sig.as_slice()) ||
					fresh.iter().any(|c| c.as_slice() == sig.as_slice());
				if !already {
					fresh.push(sig.clone());
				}
			}
			Ok(fresh)
		}

		/// Whether the collected signatory set satisfies every required key.
		fn schedule_active(schedule: &ScheduleOf<T>, required: &[ScheduleKey]) -> bool {
			let signed = |key_bytes: &[u8]| {
				schedule.signatories.iter().any(|p| prefix_signs(p.as_slice(), key_bytes))
			};
			required.iter().all(|key| key.is_active(&signed))
		}

		/// Eager trigger path, run after every signature-merging event. Under
		/// `wait_for_expiry`, activation only marks the schedule ready and the
		/// sweep performs the execution.
		fn maybe_trigger(schedule_id: u64, mut schedule: ScheduleOf<T>, now: MomentOf<T>) {
			if schedule.wait_for_expiry {
				return;
			}
			let active = Self::required_keys(&schedule)
				.map(|keys| Self::schedule_active(&schedule, &keys))
				.unwrap_or(false);
			if active {
				Self::execute_schedule(schedule_id, &mut schedule, now);
			}
		}

		/// Fire the schedule: latch `executed_at`, drop it from the live
		/// indices, then hand the body to the executor. Storage is terminal
		/// before the external call, so nothing the executor does can re-decide
		/// this schedule.
		fn execute_schedule(schedule_id: u64, schedule: &mut ScheduleOf<T>, now: MomentOf<T>) {
			let payer = schedule.payer_account().clone();
			schedule.executed_at = Some(now);
			Schedules::<T>::insert(schedule_id, &*schedule);
			Self::retire(schedule_id, schedule, now);

			// The record's consensus timestamp sits one logical unit after the
			// triggering event's.
			let record_time = now.saturating_add(One::one());
			let result =
				T::Executor::execute(schedule.body.as_slice(), &payer, record_time);
			if let Err(error) = &result {
				log::debug!(
					target: LOG_TARGET,
					"schedule {schedule_id} executed with failing result {error:?}"
				);
			}
			Self::deposit_event(Event::ScheduleExecuted {
				schedule_id,
				scheduled_tx_id: ScheduledTxId {
					payer,
					valid_start: schedule.created_at,
					scheduled: true,
					nonce: 0,
				},
				result,
			});
		}

		/// Move a schedule out of the live indices in the same logical step as
		/// its terminal transition: the fingerprint frees up for independent
		/// re-creation and the expiration index entry disappears, while the
		/// record itself is parked for later purge so queries can still observe
		/// the terminal state.
		fn retire(schedule_id: u64, schedule: &ScheduleOf<T>, now: MomentOf<T>) {
			ScheduleFingerprints::<T>::remove(schedule.fingerprint);
			let expiry_bucket = Self::bucket_for(schedule.expiration_time);
			ExpiryBuckets::<T>::mutate_exists(expiry_bucket, |maybe_ids| {
				if let Some(ids) = maybe_ids {
					ids.retain(|id| *id != schedule_id);
					if ids.is_empty() {
						*maybe_ids = None;
					}
				}
			});

			// Retain the record until its original expiration, or one bucket
			// from now when that already passed.
			let min_purge =
				Self::bucket_for(now).saturating_add(T::ExpiryBucketSize::get().max(One::one()));
			let purge_bucket = expiry_bucket.max(min_purge);
			let parked = RetiredBuckets::<T>::try_mutate(purge_bucket, |ids| {
				ids.try_push(schedule_id).map_err(|_| ())
			})
			.and_then(|_| Self::enqueue_bucket(purge_bucket).map_err(|_| ()));
			if parked.is_err() {
				// No retention slot left; drop the record immediately rather
				// than leak it.
				log::warn!(
					target: LOG_TARGET,
					"no retention slot for schedule {schedule_id}, purging immediately"
				);
				RetiredBuckets::<T>::mutate_exists(purge_bucket, |maybe_ids| {
					if let Some(ids) = maybe_ids {
						ids.retain(|id| *id != schedule_id);
						if ids.is_empty() {
							*maybe_ids = None;
						}
					}
				});
				Schedules::<T>::remove(schedule_id);
			}
		}

		/// Round a moment up to its expiration bucket boundary.
		fn bucket_for(moment: MomentOf<T>) -> MomentOf<T> {
			let size = T::ExpiryBucketSize::get();
			if size <= One::one() {
				return moment;
			}
			let rem = moment % size;
			if rem.is_zero() {
				moment
			} else {
				moment.saturating_sub(rem).saturating_add(size)
			}
		}

		/// Record a bucket boundary in the sorted sweep queue.
		fn enqueue_bucket(bucket: MomentOf<T>) -> Result<(), Error<T>> {
			ExpiryBucketQueue::<T>::try_mutate(|queue| match queue.binary_search(&bucket) {
				Ok(_) => Ok(()),
				Err(position) => queue
					.try_insert(position, bucket)
					.map_err(|_| Error::<T>::TooManyPendingBuckets),
			})
		}

		/// Per-round expiry sweep: drain every due bucket in ascending order,
		/// deciding still-pending schedules in creation order so the decision
		/// sequence is identical on every node.
		pub(crate) fn do_sweep(now: MomentOf<T>) -> Weight {
			let mut weight = T::DbWeight::get().reads(1);
			let queue = ExpiryBucketQueue::<T>::get();
			let due: Vec<MomentOf<T>> =
				queue.iter().copied().take_while(|bucket| *bucket <= now).collect();
			if due.is_empty() {
				return weight;
			}
			for bucket in &due {
				weight = weight.saturating_add(Self::sweep_bucket(*bucket, now));
			}
			// Buckets retired mid-sweep may have enqueued future purge slots;
			// re-read rather than writing back the stale copy.
			ExpiryBucketQueue::<T>::mutate(|queue| queue.retain(|bucket| *bucket > now));
			weight.saturating_add(T::DbWeight::get().reads_writes(1, 1))
		}

		fn sweep_bucket(bucket: MomentOf<T>, now: MomentOf<T>) -> Weight {
			let mut weight = T::DbWeight::get().reads_writes(2, 2);

			// Purge terminal records whose retention window closed.
			for schedule_id in RetiredBuckets::<T>::take(bucket) {
				Schedules::<T>::remove(schedule_id);
				weight = weight.saturating_add(T::DbWeight::get().writes(1));
			}

			// Only pending schedules ever remain in the expiration index;
			// terminal transitions remove themselves in the same logical step.
			for schedule_id in ExpiryBuckets::<T>::take(bucket) {
				weight = weight.saturating_add(T::DbWeight::get().reads_writes(1, 1));
				let Some(mut schedule) = Schedules::<T>::get(schedule_id) else { continue };
				let active = Self::required_keys(&schedule)
					.map(|keys| Self::schedule_active(&schedule, &keys))
					.unwrap_or(false);
				if schedule.wait_for_expiry && active {
					log::debug!(
						target: LOG_TARGET,
						"schedule {schedule_id} executing at expiration"
					);
					Self::execute_schedule(schedule_id, &mut schedule, now);
				} else {
					ScheduleFingerprints::<T>::remove(schedule.fingerprint);
					Schedules::<T>::remove(schedule_id);
					Self::deposit_event(Event::ScheduleExpired { schedule_id });
				}
			}
			weight
		}
	}
}
