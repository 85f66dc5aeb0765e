//! Category/tag/global mapping maintenance shared by CTAs and Forms.
//!
//! A category, tag or the global slot points at no more than one item. The
//! mapping tables are derived from each item's own category/tag lists:
//! whenever an item's references change it is re-synced, and an item that
//! claims a slot takes it away from whichever item held it before.

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use uuid::Uuid;

use super::types::{CategoryRef, StoredCtaConfig, StoredFormConfig};

pub trait Embed {
    /// Whether the global slot is recorded as a `"global"` category on the
    /// item itself. When false the slot is a separate pointer that survives
    /// the item's category changes.
    const GLOBAL_IS_CATEGORY: bool;

    fn id(&self) -> Uuid;
    fn name(&self) -> &str;
    /// Active CTA / enabled Form.
    fn is_live(&self) -> bool;
    fn category_refs(&self) -> Vec<CategoryRef>;
    fn tag_ids(&self) -> &[Uuid];
    fn release_category(&mut self, category: CategoryRef) -> bool;
    fn claim_category(&mut self, category: CategoryRef) -> bool;
    fn release_tag(&mut self, tag: Uuid) -> bool;
    fn claim_tag(&mut self, tag: Uuid) -> bool;
    fn version(&self) -> u32;
    fn touch(&mut self, now: DateTime<Utc>);

    fn is_global(&self) -> bool {
        self.category_refs().iter().any(CategoryRef::is_global)
    }
}

impl Embed for StoredCtaConfig {
    const GLOBAL_IS_CATEGORY: bool = true;

    fn id(&self) -> Uuid {
        self.id
    }

    fn name(&self) -> &str {
        &self.config.cta_name
    }

    fn is_live(&self) -> bool {
        self.is_active
    }

    fn category_refs(&self) -> Vec<CategoryRef> {
        self.config.categories.clone()
    }

    fn tag_ids(&self) -> &[Uuid] {
        &self.config.tags
    }

    fn release_category(&mut self, category: CategoryRef) -> bool {
        let before = self.config.categories.len();
        self.config.categories.retain(|c| *c != category);
        before != self.config.categories.len()
    }

    fn claim_category(&mut self, category: CategoryRef) -> bool {
        if self.config.categories.contains(&category) {
            return false;
        }
        self.config.categories.push(category);
        true
    }

    fn release_tag(&mut self, tag: Uuid) -> bool {
        let before = self.config.tags.len();
        self.config.tags.retain(|t| *t != tag);
        before != self.config.tags.len()
    }

    fn claim_tag(&mut self, tag: Uuid) -> bool {
        if self.config.tags.contains(&tag) {
            return false;
        }
        self.config.tags.push(tag);
        true
    }

    fn version(&self) -> u32 {
        self.version
    }

    fn touch(&mut self, now: DateTime<Utc>) {
        self.version += 1;
        self.updated_at = now;
    }
}

impl Embed for StoredFormConfig {
    const GLOBAL_IS_CATEGORY: bool = false;

    fn id(&self) -> Uuid {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn is_live(&self) -> bool {
        self.enabled
    }

    fn category_refs(&self) -> Vec<CategoryRef> {
        self.category_id.into_iter().collect()
    }

    fn tag_ids(&self) -> &[Uuid] {
        &self.config.tags
    }

    fn release_category(&mut self, category: CategoryRef) -> bool {
        if self.category_id == Some(category) {
            self.category_id = None;
            true
        } else {
            false
        }
    }

    // A form sits in a single category, so claiming replaces it.
    fn claim_category(&mut self, category: CategoryRef) -> bool {
        self.category_id.replace(category) != Some(category)
    }

    fn release_tag(&mut self, tag: Uuid) -> bool {
        let before = self.config.tags.len();
        self.config.tags.retain(|t| *t != tag);
        before != self.config.tags.len()
    }

    fn claim_tag(&mut self, tag: Uuid) -> bool {
        if self.config.tags.contains(&tag) {
            return false;
        }
        self.config.tags.push(tag);
        true
    }

    fn version(&self) -> u32 {
        self.version
    }

    fn touch(&mut self, now: DateTime<Utc>) {
        self.version += 1;
        self.updated_at = now;
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Mappings<'a> {
    pub by_category: &'a BTreeMap<Uuid, Uuid>,
    pub by_tag: &'a BTreeMap<Uuid, Uuid>,
    pub global_default: Option<Uuid>,
}

impl Mappings<'_> {
    pub fn references(&self, id: Uuid) -> bool {
        self.global_default == Some(id)
            || self.by_category.values().any(|v| *v == id)
            || self.by_tag.values().any(|v| *v == id)
    }
}

/// Read-only view over one embed collection and its mapping tables.
#[derive(Debug)]
pub struct EmbedView<'a, T> {
    pub items: &'a [T],
    pub mappings: Mappings<'a>,
}

impl<T> Clone for EmbedView<'_, T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for EmbedView<'_, T> {}

impl<'a, T: Embed> EmbedView<'a, T> {
    pub fn find(&self, id: Uuid) -> Option<&'a T> {
        self.items.iter().find(|item| item.id() == id)
    }

    pub fn is_global(&self, item: &T) -> bool {
        item.is_global() || self.mappings.global_default == Some(item.id())
    }
}

/// Mutable view over one embed collection and its mapping tables.
pub struct EmbedSet<'a, T> {
    pub items: &'a mut Vec<T>,
    pub by_category: &'a mut BTreeMap<Uuid, Uuid>,
    pub by_tag: &'a mut BTreeMap<Uuid, Uuid>,
    pub global_default: &'a mut Option<Uuid>,
}

impl<T: Embed> EmbedSet<'_, T> {
    pub fn find(&self, id: Uuid) -> Option<&T> {
        self.items.iter().find(|item| item.id() == id)
    }

    pub fn position(&self, id: Uuid) -> Option<usize> {
        self.items.iter().position(|item| item.id() == id)
    }

    /// Append a new item and give it every slot it names.
    pub fn insert(&mut self, item: T, now: DateTime<Utc>) {
        let id = item.id();
        let categories = item.category_refs();
        let tags = item.tag_ids().to_vec();
        self.items.push(item);
        self.claim_slots(id, &categories, &tags, now);
        self.resync(id);
    }

    /// Swap in a new body for an existing item, keeping its stored position.
    pub fn replace(&mut self, item: T, now: DateTime<Utc>) -> Option<T> {
        let id = item.id();
        let index = self.position(id)?;
        let categories = item.category_refs();
        let tags = item.tag_ids().to_vec();
        let previous = std::mem::replace(&mut self.items[index], item);
        self.claim_slots(id, &categories, &tags, now);
        self.resync(id);
        Some(previous)
    }

    /// Remove an item and every mapping entry that points at it.
    pub fn remove(&mut self, id: Uuid) -> Option<T> {
        let index = self.position(id)?;
        let removed = self.items.remove(index);
        self.strip(id);
        Some(removed)
    }

    /// Point `category` at `target`, or clear it when `target` is `None`.
    pub fn set_category(&mut self, category: CategoryRef, target: Option<Uuid>, now: DateTime<Utc>) {
        if category.is_global() && !T::GLOBAL_IS_CATEGORY {
            self.set_global_pointer(target, now);
            return;
        }
        let mut affected = self.release_everywhere(
            |item| Some(item.id()) != target && item.release_category(category),
            now,
        );
        if let Some(target) = target {
            if let Some(item) = self.items.iter_mut().find(|item| item.id() == target) {
                // Forms hold a single category; the one they give up must be resynced too.
                if item.claim_category(category) {
                    item.touch(now);
                }
                affected.push(target);
            }
        }
        for id in affected {
            self.resync(id);
        }
        if target.is_none() {
            match category {
                CategoryRef::Global => *self.global_default = None,
                CategoryRef::Category(id) => {
                    self.by_category.remove(&id);
                }
            }
        }
    }

    /// Global slot for items that keep it as a pointer: the target keeps its
    /// own category, and items filed under `"global"` give that up.
    fn set_global_pointer(&mut self, target: Option<Uuid>, now: DateTime<Utc>) {
        let affected = self.release_everywhere(
            |item| Some(item.id()) != target && item.release_category(CategoryRef::Global),
            now,
        );
        for id in affected {
            self.resync(id);
        }
        let target = target.filter(|id| self.items.iter().any(|item| item.id() == *id));
        *self.global_default = target;
    }

    /// Point `tag` at `target`, or clear it when `target` is `None`.
    pub fn set_tag(&mut self, tag: Uuid, target: Option<Uuid>, now: DateTime<Utc>) {
        let mut affected = self.release_everywhere(
            |item| Some(item.id()) != target && item.release_tag(tag),
            now,
        );
        if let Some(target) = target {
            if let Some(item) = self.items.iter_mut().find(|item| item.id() == target) {
                if item.claim_tag(tag) {
                    item.touch(now);
                }
                affected.push(target);
            }
        }
        for id in affected {
            self.resync(id);
        }
        if target.is_none() {
            self.by_tag.remove(&tag);
        }
    }

    /// Drop a deleted category from every item and mapping table.
    pub fn forget_category(&mut self, category: Uuid, now: DateTime<Utc>) {
        self.set_category(CategoryRef::Category(category), None, now);
    }

    /// Drop a deleted tag from every item and mapping table.
    pub fn forget_tag(&mut self, tag: Uuid, now: DateTime<Utc>) {
        self.set_tag(tag, None, now);
    }

    fn claim_slots(&mut self, id: Uuid, categories: &[CategoryRef], tags: &[Uuid], now: DateTime<Utc>) {
        let mut affected = Vec::new();
        for item in self.items.iter_mut().filter(|item| item.id() != id) {
            let mut changed = false;
            for category in categories {
                changed |= item.release_category(*category);
            }
            for tag in tags {
                changed |= item.release_tag(*tag);
            }
            if changed {
                item.touch(now);
                affected.push(item.id());
            }
        }
        for other in affected {
            self.resync(other);
        }
    }

    fn release_everywhere(
        &mut self,
        mut release: impl FnMut(&mut T) -> bool,
        now: DateTime<Utc>,
    ) -> Vec<Uuid> {
        let mut affected = Vec::new();
        for item in self.items.iter_mut() {
            if release(item) {
                item.touch(now);
                affected.push(item.id());
            }
        }
        affected
    }

    fn strip(&mut self, id: Uuid) {
        self.by_category.retain(|_, target| *target != id);
        self.by_tag.retain(|_, target| *target != id);
        if *self.global_default == Some(id) {
            *self.global_default = None;
        }
    }

    /// Rewrite the mapping entries of one item from its own references.
    fn resync(&mut self, id: Uuid) {
        let held_global = *self.global_default == Some(id);
        self.strip(id);
        let Some(item) = self.items.iter().find(|item| item.id() == id) else {
            return;
        };
        if held_global && !T::GLOBAL_IS_CATEGORY {
            *self.global_default = Some(id);
        }
        for category in item.category_refs() {
            match category {
                CategoryRef::Global => *self.global_default = Some(id),
                CategoryRef::Category(category_id) => {
                    self.by_category.insert(category_id, id);
                }
            }
        }
        for tag in item.tag_ids() {
            self.by_tag.insert(*tag, id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeds::types::{CtaConfig, CtaContent, CtaTrigger, CtaType, FormConfig};

    fn cta(name: &str, categories: Vec<CategoryRef>, tags: Vec<Uuid>) -> StoredCtaConfig {
        let now = Utc::now();
        StoredCtaConfig {
            id: Uuid::new_v4(),
            config: CtaConfig {
                cta_name: name.to_string(),
                cta_type: CtaType::Banner,
                categories,
                tags,
                trigger: CtaTrigger::Immediate,
                content: CtaContent::default(),
            },
            is_active: true,
            created_at: now,
            updated_at: now,
            version: 1,
        }
    }

    fn form(name: &str, category: Option<CategoryRef>) -> StoredFormConfig {
        let now = Utc::now();
        StoredFormConfig {
            id: Uuid::new_v4(),
            name: name.to_string(),
            category_id: category,
            config: FormConfig::default(),
            enabled: true,
            created_at: now,
            updated_at: now,
            version: 1,
        }
    }

    struct Fixture<T> {
        items: Vec<T>,
        by_category: BTreeMap<Uuid, Uuid>,
        by_tag: BTreeMap<Uuid, Uuid>,
        global: Option<Uuid>,
    }

    impl<T: Embed> Fixture<T> {
        fn new() -> Self {
            Self {
                items: Vec::new(),
                by_category: BTreeMap::new(),
                by_tag: BTreeMap::new(),
                global: None,
            }
        }

        fn set(&mut self) -> EmbedSet<'_, T> {
            EmbedSet {
                items: &mut self.items,
                by_category: &mut self.by_category,
                by_tag: &mut self.by_tag,
                global_default: &mut self.global,
            }
        }
    }

    #[test]
    fn test_insert_claims_slots_from_previous_holder() {
        let news = Uuid::new_v4();
        let rust = Uuid::new_v4();
        let mut fx = Fixture::new();

        let first = cta("first", vec![CategoryRef::Category(news), CategoryRef::Global], vec![rust]);
        let first_id = first.id;
        fx.set().insert(first, Utc::now());
        assert_eq!(fx.by_category.get(&news), Some(&first_id));
        assert_eq!(fx.by_tag.get(&rust), Some(&first_id));
        assert_eq!(fx.global, Some(first_id));

        let second = cta("second", vec![CategoryRef::Global], vec![]);
        let second_id = second.id;
        fx.set().insert(second, Utc::now());

        assert_eq!(fx.global, Some(second_id));
        assert_eq!(fx.by_category.get(&news), Some(&first_id));
        let first = fx.items.iter().find(|c| c.id == first_id).unwrap();
        assert_eq!(first.config.categories, vec![CategoryRef::Category(news)]);
        assert_eq!(first.version, 2);
    }

    #[test]
    fn test_remove_strips_every_reference() {
        let news = Uuid::new_v4();
        let tag = Uuid::new_v4();
        let mut fx = Fixture::new();

        let item = cta("doomed", vec![CategoryRef::Category(news), CategoryRef::Global], vec![tag]);
        let id = item.id;
        fx.set().insert(item, Utc::now());
        fx.set().insert(cta("keeper", vec![], vec![]), Utc::now());

        assert!(fx.set().remove(id).is_some());
        assert!(!fx.by_category.values().any(|v| *v == id));
        assert!(!fx.by_tag.values().any(|v| *v == id));
        assert_eq!(fx.global, None);
        assert_eq!(fx.items.len(), 1);
        assert!(fx.set().remove(id).is_none());
    }

    #[test]
    fn test_replace_drops_stale_entries() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let mut fx = Fixture::new();

        let item = cta("moving", vec![CategoryRef::Category(a)], vec![]);
        let id = item.id;
        fx.set().insert(item.clone(), Utc::now());

        let mut moved = item;
        moved.config.categories = vec![CategoryRef::Category(b)];
        fx.set().replace(moved, Utc::now());

        assert!(!fx.by_category.contains_key(&a));
        assert_eq!(fx.by_category.get(&b), Some(&id));
    }

    #[test]
    fn test_form_category_claim_moves_single_slot() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let mut fx = Fixture::new();

        let item = form("lead", Some(CategoryRef::Category(a)));
        let id = item.id;
        fx.set().insert(item, Utc::now());
        assert_eq!(fx.by_category.get(&a), Some(&id));

        fx.set().set_category(CategoryRef::Category(b), Some(id), Utc::now());
        assert!(!fx.by_category.contains_key(&a));
        assert_eq!(fx.by_category.get(&b), Some(&id));
        assert_eq!(fx.items[0].category_id, Some(CategoryRef::Category(b)));
    }

    #[test]
    fn test_form_global_default_keeps_its_category() {
        let news = Uuid::new_v4();
        let mut fx = Fixture::new();

        let filed = form("filed", Some(CategoryRef::Global));
        let filed_id = filed.id;
        fx.set().insert(filed, Utc::now());
        let item = form("signup", Some(CategoryRef::Category(news)));
        let id = item.id;
        fx.set().insert(item, Utc::now());
        assert_eq!(fx.global, Some(filed_id));

        fx.set().set_category(CategoryRef::Global, Some(id), Utc::now());
        assert_eq!(fx.global, Some(id));
        assert_eq!(fx.by_category.get(&news), Some(&id));
        assert_eq!(fx.items[1].category_id, Some(CategoryRef::Category(news)));
        assert_eq!(fx.items[1].version, 1);
        assert_eq!(fx.items[0].category_id, None);

        // Later category changes leave the pointer alone.
        let other = Uuid::new_v4();
        fx.set().set_category(CategoryRef::Category(other), Some(id), Utc::now());
        assert_eq!(fx.global, Some(id));

        fx.set().set_category(CategoryRef::Global, None, Utc::now());
        assert_eq!(fx.global, None);
        assert_eq!(fx.by_category.get(&other), Some(&id));
    }

    #[test]
    fn test_reassigning_to_current_holder_is_a_no_op() {
        let news = Uuid::new_v4();
        let tag = Uuid::new_v4();
        let mut fx = Fixture::new();
        let item = cta("holder", vec![CategoryRef::Category(news)], vec![tag]);
        let id = item.id;
        fx.set().insert(item, Utc::now());

        fx.set().set_category(CategoryRef::Category(news), Some(id), Utc::now());
        fx.set().set_tag(tag, Some(id), Utc::now());
        assert_eq!(fx.items[0].version, 1);
        assert_eq!(fx.by_category.get(&news), Some(&id));
        assert_eq!(fx.by_tag.get(&tag), Some(&id));
    }

    #[test]
    fn test_clearing_global_default() {
        let mut fx = Fixture::new();
        let item = cta("global", vec![CategoryRef::Global], vec![]);
        let id = item.id;
        fx.set().insert(item, Utc::now());
        assert_eq!(fx.global, Some(id));

        fx.set().set_category(CategoryRef::Global, None, Utc::now());
        assert_eq!(fx.global, None);
        assert!(fx.items[0].config.categories.is_empty());
    }

    #[test]
    fn test_forget_tag() {
        let tag = Uuid::new_v4();
        let mut fx = Fixture::new();
        fx.set().insert(cta("tagged", vec![], vec![tag]), Utc::now());
        fx.set().forget_tag(tag, Utc::now());
        assert!(fx.by_tag.is_empty());
        assert!(fx.items[0].config.tags.is_empty());
    }
}
