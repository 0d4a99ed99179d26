//! Mutation handler registry
//!
//! One `MutationHandler` per `MutationType`, describing the remote table, the
//! operation, the parent references that must exist before the write and the
//! fields that may carry staged attachments. The table is populated from an
//! exhaustive match, so adding a payload variant without a handler does not
//! compile.

use super::staging::StagedAttachmentRef;
use crate::domain::{EntityTable, Mutation, MutationPayload, MutationType, ParentRef};
use once_cell::sync::Lazy;
use std::collections::{HashMap, HashSet};
use strum::{Display, IntoEnumIterator};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum RemoteOperation {
	Upsert,
	Delete,
}

/// Field of a row referencing a row of another table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParentField {
	pub field: &'static str,
	pub table: EntityTable,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutationHandler {
	pub mutation_type: MutationType,
	pub table: EntityTable,
	pub operation: RemoteOperation,
	pub conflict_key: &'static str,
	/// Any one resolving is enough for the write to proceed
	pub parents: &'static [ParentField],
	pub attachments: &'static [&'static str],
}

const SHIFT_PARENT: &[ParentField] = &[ParentField {
	field: "shift_id",
	table: EntityTable::Shifts,
}];

const ORDER_PARENT: &[ParentField] = &[ParentField {
	field: "order_id",
	table: EntityTable::Orders,
}];

const PAYMENT_PARENTS: &[ParentField] = &[
	ParentField {
		field: "order_id",
		table: EntityTable::Orders,
	},
	ParentField {
		field: "shift_id",
		table: EntityTable::Shifts,
	},
];

const MENU_ITEM_ATTACHMENTS: &[&str] = &["image"];

fn describe(mutation_type: MutationType) -> MutationHandler {
	use MutationType::*;

	let (table, operation, parents, attachments): (_, _, &'static [ParentField], &'static [&str]) =
		match mutation_type {
			UpsertShift => (EntityTable::Shifts, RemoteOperation::Upsert, &[], &[]),
			DeleteShift => (EntityTable::Shifts, RemoteOperation::Delete, &[], &[]),
			UpsertDiningTable => (EntityTable::DiningTables, RemoteOperation::Upsert, &[], &[]),
			DeleteDiningTable => (EntityTable::DiningTables, RemoteOperation::Delete, &[], &[]),
			UpsertMenuItem => (
				EntityTable::MenuItems,
				RemoteOperation::Upsert,
				&[],
				MENU_ITEM_ATTACHMENTS,
			),
			DeleteMenuItem => (EntityTable::MenuItems, RemoteOperation::Delete, &[], &[]),
			UpsertOrder => (EntityTable::Orders, RemoteOperation::Upsert, SHIFT_PARENT, &[]),
			DeleteOrder => (EntityTable::Orders, RemoteOperation::Delete, &[], &[]),
			UpsertOrderItem => (
				EntityTable::OrderItems,
				RemoteOperation::Upsert,
				ORDER_PARENT,
				&[],
			),
			DeleteOrderItem => (EntityTable::OrderItems, RemoteOperation::Delete, &[], &[]),
			UpsertPayment => (
				EntityTable::Payments,
				RemoteOperation::Upsert,
				PAYMENT_PARENTS,
				&[],
			),
			DeletePayment => (EntityTable::Payments, RemoteOperation::Delete, &[], &[]),
		};

	MutationHandler {
		mutation_type,
		table,
		operation,
		conflict_key: "id",
		parents,
		attachments,
	}
}

static HANDLERS: Lazy<HashMap<MutationType, MutationHandler>> =
	Lazy::new(|| MutationType::iter().map(|ty| (ty, describe(ty))).collect());

/// Handler for a mutation type
pub fn handler(mutation_type: MutationType) -> &'static MutationHandler {
	// Populated for every variant of MutationType
	&HANDLERS[&mutation_type]
}

impl MutationHandler {
	/// Non-null parent references carried by the payload
	pub fn parent_refs(&self, payload: &MutationPayload) -> Vec<ParentRef> {
		let Some(row) = payload.row() else {
			return Vec::new();
		};

		self.parents
			.iter()
			.filter_map(|parent| {
				row.str_field(parent.field).map(|id| ParentRef {
					table: parent.table,
					id: id.to_string(),
				})
			})
			.collect()
	}

	/// Attachment fields of the payload still pointing at staged bytes
	pub fn staged_attachments(
		&self,
		payload: &MutationPayload,
	) -> Vec<(&'static str, StagedAttachmentRef)> {
		let Some(row) = payload.row() else {
			return Vec::new();
		};

		self.attachments
			.iter()
			.filter_map(|field| {
				row.field(field)
					.and_then(StagedAttachmentRef::from_value)
					.map(|staged| (*field, staged))
			})
			.collect()
	}
}

/// Staged keys referenced by a payload
pub fn staged_keys(payload: &MutationPayload) -> Vec<String> {
	handler(payload.mutation_type())
		.staged_attachments(payload)
		.into_iter()
		.map(|(_, staged)| staged.staged_key)
		.collect()
}

/// Every staged key referenced by any of `mutations`
pub fn referenced_staged_keys(mutations: &[Mutation]) -> HashSet<String> {
	mutations
		.iter()
		.flat_map(|mutation| staged_keys(&mutation.payload))
		.collect()
}
