use serde::Serialize;
use uuid::Uuid;

use super::mapping::{Embed, EmbedView};

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum MatchRule {
    Category,
    Tag,
    Global,
}

#[derive(Debug)]
pub struct Resolved<'a, T> {
    pub item: &'a T,
    pub rule: MatchRule,
    /// The category or tag whose mapping matched; `None` for the global default.
    pub matched_on: Option<Uuid>,
}

/// Pick the effective CTA/Form for a post: the first live mapping among the
/// post's categories (in post order), then its tags, then the global default.
pub fn resolve<'a, T: Embed>(
    view: EmbedView<'a, T>,
    categories: &[Uuid],
    tags: &[Uuid],
) -> Option<Resolved<'a, T>> {
    let live = |id: Option<&Uuid>| id.and_then(|id| view.find(*id)).filter(|item| item.is_live());

    for category in categories {
        if let Some(item) = live(view.mappings.by_category.get(category)) {
            return Some(Resolved {
                item,
                rule: MatchRule::Category,
                matched_on: Some(*category),
            });
        }
    }

    for tag in tags {
        if let Some(item) = live(view.mappings.by_tag.get(tag)) {
            return Some(Resolved {
                item,
                rule: MatchRule::Tag,
                matched_on: Some(*tag),
            });
        }
    }

    live(view.mappings.global_default.as_ref()).map(|item| Resolved {
        item,
        rule: MatchRule::Global,
        matched_on: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeds::mapping::Mappings;
    use crate::embeds::types::{CtaConfig, CtaContent, CtaTrigger, CtaType, StoredCtaConfig};
    use chrono::Utc;
    use std::collections::BTreeMap;

    fn cta(name: &str, active: bool) -> StoredCtaConfig {
        let now = Utc::now();
        StoredCtaConfig {
            id: Uuid::new_v4(),
            config: CtaConfig {
                cta_name: name.to_string(),
                cta_type: CtaType::Inline,
                categories: vec![],
                tags: vec![],
                trigger: CtaTrigger::Immediate,
                content: CtaContent::default(),
            },
            is_active: active,
            created_at: now,
            updated_at: now,
            version: 1,
        }
    }

    #[test]
    fn test_category_beats_tag_beats_global() {
        let cat_cta = cta("category", true);
        let tag_cta = cta("tag", true);
        let global_cta = cta("global", true);
        let category = Uuid::new_v4();
        let tag = Uuid::new_v4();

        let by_category = BTreeMap::from([(category, cat_cta.id)]);
        let by_tag = BTreeMap::from([(tag, tag_cta.id)]);
        let items = vec![cat_cta.clone(), tag_cta.clone(), global_cta.clone()];
        let view = EmbedView {
            items: &items,
            mappings: Mappings {
                by_category: &by_category,
                by_tag: &by_tag,
                global_default: Some(global_cta.id),
            },
        };

        let hit = resolve(view, &[category], &[tag]).unwrap();
        assert_eq!(hit.item.id, cat_cta.id);
        assert_eq!(hit.rule, MatchRule::Category);

        let hit = resolve(view, &[Uuid::new_v4()], &[tag]).unwrap();
        assert_eq!(hit.item.id, tag_cta.id);
        assert_eq!(hit.matched_on, Some(tag));

        let hit = resolve(view, &[], &[]).unwrap();
        assert_eq!(hit.item.id, global_cta.id);
        assert_eq!(hit.rule, MatchRule::Global);
    }

    #[test]
    fn test_inactive_items_fall_through() {
        let paused = cta("paused", false);
        let fallback = cta("fallback", true);
        let category = Uuid::new_v4();

        let by_category = BTreeMap::from([(category, paused.id)]);
        let by_tag = BTreeMap::new();
        let items = vec![paused, fallback.clone()];
        let view = EmbedView {
            items: &items,
            mappings: Mappings {
                by_category: &by_category,
                by_tag: &by_tag,
                global_default: Some(fallback.id),
            },
        };

        let hit = resolve(view, &[category], &[]).unwrap();
        assert_eq!(hit.item.id, fallback.id);
        assert_eq!(hit.rule, MatchRule::Global);
    }

    #[test]
    fn test_nothing_mapped() {
        let items: Vec<StoredCtaConfig> = vec![];
        let empty = BTreeMap::new();
        let view = EmbedView {
            items: &items,
            mappings: Mappings {
                by_category: &empty,
                by_tag: &empty,
                global_default: None,
            },
        };
        assert!(resolve(view, &[Uuid::new_v4()], &[Uuid::new_v4()]).is_none());
    }
}
