use std::collections::BTreeSet;

use pretty_assertions::assert_eq;
use proptest::prelude::*;

use super::*;
use crate::catalog::AccessGrant;
use crate::error::ScopeViolation;
use crate::org::{Brand, Company, OrgNode, OrgTree, Store};
use crate::role::Role;

const BRANDS: usize = 4;
const STORES: usize = 10;

fn brand_of(store: usize) -> usize {
	store % BRANDS
}

fn tree() -> OrgTree {
	let mut nodes = vec![OrgNode::Company(Company {
		id: "acme".into(),
		name: "Acme".into(),
		active: true,
	})];
	for b in 0..BRANDS {
		nodes.push(OrgNode::Brand(Brand {
			id: format!("b{b}").into(),
			company_id: "acme".into(),
			name: format!("Brand {b}"),
			active: true,
		}));
	}
	for s in 0..STORES {
		nodes.push(OrgNode::Store(Store {
			id: format!("s{s}").into(),
			brand_id: format!("b{}", brand_of(s)).into(),
			name: format!("Store {s}"),
			active: true,
		}));
	}
	OrgTree::from_nodes(nodes).unwrap()
}

fn resolver(grant: AccessGrant) -> ScopeResolver {
	ScopeResolver::new(Arc::new(ScopeCatalog::new(tree(), &grant).unwrap()))
}

fn store_sel(brand: &str, store: &str) -> ScopeSelection {
	ScopeSelection::Store {
		brand_id: brand.into(),
		store_id: store.into(),
	}
}

#[test]
fn starts_at_broadest_accessible_level() {
	let admin = resolver(AccessGrant::unrestricted(Role::Admin, "acme"));
	assert_eq!(admin.selection(), &ScopeSelection::Company { company_id: "acme".into() });

	let manager = resolver(AccessGrant::restricted(Role::Manager, "acme", [BrandId::new("b2"), BrandId::new("b1")], Vec::<StoreId>::new()));
	assert_eq!(manager.selection(), &ScopeSelection::Brand { brand_id: "b1".into() });
}

#[test]
fn store_outside_access_set_is_rejected_and_selection_kept() {
	// b1 with stores s1 and s5 (store index modulo brand count).
	let mut r = resolver(AccessGrant::restricted(Role::Write, "acme", [BrandId::new("b1")], [StoreId::new("s1"), StoreId::new("s5")]));

	let change = r.select_store(&"s5".into()).unwrap().unwrap();
	assert_eq!(change.current, store_sel("b1", "s5"));
	assert_eq!(r.key().as_str(), "store:s5");

	let err = r.select_store(&"s9".into()).unwrap_err();
	assert_eq!(err, ScopeViolation {
		target: ScopeTarget::Store("s9".into())
	});
	assert_eq!(r.selection(), &store_sel("b1", "s5"));
}

#[test]
fn brand_outside_access_set_is_rejected() {
	let mut r = resolver(AccessGrant::restricted(Role::Manager, "acme", [BrandId::new("b1")], Vec::<StoreId>::new()));
	let before = r.selection().clone();
	assert!(r.select_brand(&"b2".into()).is_err());
	assert!(r.select_company_wide().is_err());
	assert_eq!(r.selection(), &before);
}

#[test]
fn selecting_store_in_other_brand_moves_brand_atomically() {
	let mut r = resolver(AccessGrant::unrestricted(Role::Admin, "acme"));
	r.select_store(&"s1".into()).unwrap();
	let change = r.select_store(&"s2".into()).unwrap().unwrap();

	assert_eq!(change.previous, store_sel("b1", "s1"));
	assert_eq!(change.current, store_sel("b2", "s2"));
	assert!(change.key_changed());
}

#[test]
fn selecting_brand_clears_store() {
	let mut r = resolver(AccessGrant::unrestricted(Role::Admin, "acme"));
	r.select_store(&"s6".into()).unwrap();
	let change = r.select_brand(&"b2".into()).unwrap().unwrap();
	assert_eq!(change.current, ScopeSelection::Brand { brand_id: "b2".into() });
	assert_eq!(r.selection().store_id(), None);
}

#[test]
fn reselecting_current_scope_is_not_a_change() {
	let mut r = resolver(AccessGrant::unrestricted(Role::Admin, "acme"));
	assert_eq!(r.select_company_wide(), Ok(None));
	r.select_brand(&"b0".into()).unwrap();
	assert_eq!(r.select_brand(&"b0".into()), Ok(None));
}

#[test]
fn refreshed_catalog_keeps_permitted_selection() {
	let mut r = resolver(AccessGrant::unrestricted(Role::Admin, "acme"));
	r.select_store(&"s3".into()).unwrap();

	let narrower = ScopeCatalog::new(tree(), &AccessGrant::restricted(Role::Manager, "acme", [BrandId::new("b3")], [StoreId::new("s3")])).unwrap();
	assert_eq!(r.replace_catalog(Arc::new(narrower)), None);
	assert_eq!(r.selection(), &store_sel("b3", "s3"));
}

#[test]
fn refreshed_catalog_revokes_selection_to_new_default() {
	let mut r = resolver(AccessGrant::unrestricted(Role::Admin, "acme"));
	r.select_store(&"s3".into()).unwrap();

	let revoked = ScopeCatalog::new(tree(), &AccessGrant::restricted(Role::Manager, "acme", [BrandId::new("b2")], Vec::<StoreId>::new())).unwrap();
	let change = r.replace_catalog(Arc::new(revoked)).unwrap();
	assert_eq!(change.previous, store_sel("b3", "s3"));
	assert_eq!(change.current, ScopeSelection::Brand { brand_id: "b2".into() });
}

#[derive(Debug, Clone)]
enum Op {
	Company,
	Brand(usize),
	Store(usize),
}

fn op() -> impl Strategy<Value = Op> {
	prop_oneof![
		Just(Op::Company),
		(0..BRANDS + 2).prop_map(Op::Brand),
		(0..STORES + 3).prop_map(Op::Store),
	]
}

fn grant() -> impl Strategy<Value = AccessGrant> {
	(
		any::<bool>(),
		proptest::collection::btree_set(0..BRANDS, 1..=BRANDS),
		proptest::option::of(proptest::collection::btree_set(0..STORES + 2, 0..STORES)),
	)
		.prop_map(|(unrestricted, brands, stores)| {
			if unrestricted {
				return AccessGrant::unrestricted(Role::Admin, "acme");
			}
			AccessGrant {
				role: Role::Manager,
				company_id: "acme".into(),
				brand_ids: Some(brands.into_iter().map(|b| BrandId::new(format!("b{b}"))).collect::<BTreeSet<_>>()),
				store_ids: stores.map(|set| set.into_iter().map(|s| StoreId::new(format!("s{s}"))).collect()),
			}
		})
}

proptest! {
	#[test]
	fn selection_stays_inside_access_set(grant in grant(), ops in proptest::collection::vec(op(), 1..40)) {
		let mut r = resolver(grant);
		for op in ops {
			let before = r.selection().clone();
			let result = match &op {
				Op::Company => r.select_company_wide(),
				Op::Brand(b) => r.select_brand(&BrandId::new(format!("b{b}"))),
				Op::Store(s) => r.select_store(&StoreId::new(format!("s{s}"))),
			};

			let catalog = Arc::clone(r.catalog());
			prop_assert!(catalog.permits(r.selection()), "selection {} escaped access set after {:?}", r.selection(), op);
			if result.is_err() {
				prop_assert_eq!(r.selection(), &before);
			}
			if let (Op::Store(s), Ok(_)) = (&op, &result) {
				prop_assert_eq!(r.selection().brand_id(), Some(&BrandId::new(format!("b{}", brand_of(*s)))));
			}
		}
	}
}
