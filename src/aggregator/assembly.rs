//! Per-view discovery rules.
//!
//! Each [`Assembly`] tags the children of one kind of composite view with a
//! role and says which further children a newly arrived child requires.

use std::fmt::Debug;

use hyperlog_types::ResourceKey;

use super::FanInAggregator;
use crate::links::LinkResolver;

pub trait Assembly: Send + Sync + 'static {
    type Role: Copy + Eq + Debug + Send + Sync;

    /// Prefix of generated aggregator names.
    const KIND: &'static str;

    fn root_role() -> Self::Role;

    /// Role of resources expected after the root (no discovery is run for them).
    fn extra_role() -> Self::Role;

    /// Children required by the arrival of `url` in `role`.
    fn discover(
        &self,
        role: Self::Role,
        url: &str,
        body: &str,
        resolver: &dyn LinkResolver,
    ) -> Vec<(ResourceKey, Self::Role)>;
}

fn child(url: String, referrer: &str) -> ResourceKey {
    ResourceKey::json(url).with_referrer(referrer)
}

// ==================== Object view ====================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectRole {
    Object,
    Layout,
    Collection,
    Extra,
}

/// Object, then its layout, then every collection the layout references.
#[derive(Debug, Default, Clone, Copy)]
pub struct ObjectAssembly;

impl Assembly for ObjectAssembly {
    type Role = ObjectRole;
    const KIND: &'static str = "object";

    fn root_role() -> ObjectRole {
        ObjectRole::Object
    }

    fn extra_role() -> ObjectRole {
        ObjectRole::Extra
    }

    fn discover(
        &self,
        role: ObjectRole,
        url: &str,
        body: &str,
        resolver: &dyn LinkResolver,
    ) -> Vec<(ResourceKey, ObjectRole)> {
        match role {
            ObjectRole::Object => resolver
                .layout_link(body)
                .map(|layout| vec![(child(layout, url), ObjectRole::Layout)])
                .unwrap_or_default(),
            ObjectRole::Layout => resolver
                .layout_collections(body)
                .into_iter()
                .map(|collection| (child(collection, url), ObjectRole::Collection))
                .collect(),
            ObjectRole::Collection | ObjectRole::Extra => Vec::new(),
        }
    }
}

// ==================== List view ====================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListRole {
    List,
    /// First member, standing in for the column metadata of the whole list.
    Prototype,
    Layout,
    Property,
    Extra,
}

/// List, then the first member, then that member's layout and property resources.
#[derive(Debug, Default, Clone, Copy)]
pub struct ListAssembly;

impl Assembly for ListAssembly {
    type Role = ListRole;
    const KIND: &'static str = "list";

    fn root_role() -> ListRole {
        ListRole::List
    }

    fn extra_role() -> ListRole {
        ListRole::Extra
    }

    fn discover(
        &self,
        role: ListRole,
        url: &str,
        body: &str,
        resolver: &dyn LinkResolver,
    ) -> Vec<(ResourceKey, ListRole)> {
        match role {
            ListRole::List => resolver
                .list_members(body)
                .into_iter()
                .next()
                .map(|first| vec![(child(first, url), ListRole::Prototype)])
                .unwrap_or_default(),
            ListRole::Prototype => {
                let mut children: Vec<_> = resolver
                    .layout_link(body)
                    .map(|layout| (child(layout, url), ListRole::Layout))
                    .into_iter()
                    .collect();
                children.extend(
                    resolver
                        .property_resources(body)
                        .into_iter()
                        .map(|property| (child(property, url), ListRole::Property)),
                );
                children
            }
            ListRole::Layout | ListRole::Property | ListRole::Extra => Vec::new(),
        }
    }
}

// ==================== Single resource ====================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SingleRole {
    Resource,
    Extra,
}

/// One resource with no dependents (action results, diagrams, menus).
#[derive(Debug, Default, Clone, Copy)]
pub struct SingleAssembly;

impl Assembly for SingleAssembly {
    type Role = SingleRole;
    const KIND: &'static str = "single";

    fn root_role() -> SingleRole {
        SingleRole::Resource
    }

    fn extra_role() -> SingleRole {
        SingleRole::Extra
    }

    fn discover(
        &self,
        _role: SingleRole,
        _url: &str,
        _body: &str,
        _resolver: &dyn LinkResolver,
    ) -> Vec<(ResourceKey, SingleRole)> {
        Vec::new()
    }
}

pub type ObjectAggregator = FanInAggregator<ObjectAssembly>;
pub type ListAggregator = FanInAggregator<ListAssembly>;
pub type SingleAggregator = FanInAggregator<SingleAssembly>;
