//! Catalog helpers: slugs and the category tree.

use std::collections::HashMap;

use bazaar_core::CategoryId;

use crate::models::{Category, CategoryNode};

/// Turn a display name into a URL slug.
///
/// Lowercases ASCII letters, keeps digits, and collapses every other run of
/// characters into a single `-`. Leading and trailing dashes are dropped.
#[must_use]
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut pending_dash = false;

    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c.to_ascii_lowercase());
        } else {
            pending_dash = true;
        }
    }

    slug
}

/// Whether making `new_parent` the parent of `id` would put `id` in its own
/// ancestry.
///
/// `parents` maps every live category to its parent. A chain that runs into
/// an unknown ID simply ends there.
#[must_use]
pub fn would_create_cycle(
    id: CategoryId,
    new_parent: Option<CategoryId>,
    parents: &HashMap<CategoryId, Option<CategoryId>>,
) -> bool {
    let mut current = new_parent;
    // A well-formed tree has fewer hops than nodes; stop if the stored data loops.
    let mut hops = 0;
    while let Some(ancestor) = current {
        if ancestor == id {
            return true;
        }
        hops += 1;
        if hops > parents.len() {
            return true;
        }
        current = parents.get(&ancestor).copied().flatten();
    }
    false
}

/// Nest a flat category list by `parent_id`.
///
/// Input order is kept among siblings, so pass categories sorted by
/// `position, name`. Categories whose parent is missing (inactive or deleted)
/// are dropped together with their subtree.
#[must_use]
pub fn build_tree(categories: Vec<Category>) -> Vec<CategoryNode> {
    let mut by_parent: HashMap<Option<CategoryId>, Vec<Category>> = HashMap::new();
    for category in categories {
        by_parent.entry(category.parent_id).or_default().push(category);
    }

    fn attach(
        parent: Option<CategoryId>,
        by_parent: &mut HashMap<Option<CategoryId>, Vec<Category>>,
    ) -> Vec<CategoryNode> {
        by_parent
            .remove(&parent)
            .unwrap_or_default()
            .into_iter()
            .map(|category| {
                let children = attach(Some(category.id), by_parent);
                CategoryNode { category, children }
            })
            .collect()
    }

    attach(None, &mut by_parent)
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;

    fn category(id: i32, parent: Option<i32>, name: &str) -> Category {
        Category {
            id: CategoryId::new(id),
            parent_id: parent.map(CategoryId::new),
            name: name.to_owned(),
            slug: slugify(name),
            description: None,
            position: 0,
            is_active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Men's T-Shirts"), "men-s-t-shirts");
        assert_eq!(slugify("  Home & Kitchen  "), "home-kitchen");
        assert_eq!(slugify("USB-C 2.0"), "usb-c-2-0");
        assert_eq!(slugify("---"), "");
    }

    #[test]
    fn test_cycle_detection() {
        // 1 -> 2 -> 3 (3 is a grandchild of 1)
        let parents = HashMap::from([
            (CategoryId::new(1), None),
            (CategoryId::new(2), Some(CategoryId::new(1))),
            (CategoryId::new(3), Some(CategoryId::new(2))),
        ]);

        assert!(would_create_cycle(
            CategoryId::new(1),
            Some(CategoryId::new(3)),
            &parents
        ));
        assert!(would_create_cycle(
            CategoryId::new(2),
            Some(CategoryId::new(2)),
            &parents
        ));
        assert!(!would_create_cycle(
            CategoryId::new(3),
            Some(CategoryId::new(1)),
            &parents
        ));
        assert!(!would_create_cycle(CategoryId::new(2), None, &parents));
    }

    #[test]
    fn test_cycle_detection_survives_looping_data() {
        let parents = HashMap::from([
            (CategoryId::new(1), Some(CategoryId::new(2))),
            (CategoryId::new(2), Some(CategoryId::new(1))),
        ]);
        assert!(would_create_cycle(
            CategoryId::new(9),
            Some(CategoryId::new(1)),
            &parents
        ));
    }

    #[test]
    fn test_build_tree() {
        let tree = build_tree(vec![
            category(1, None, "Apparel"),
            category(2, Some(1), "Shirts"),
            category(3, Some(2), "Polo"),
            category(4, None, "Books"),
            category(5, Some(99), "Orphan"),
        ]);

        assert_eq!(tree.len(), 2);
        assert_eq!(tree[0].category.name, "Apparel");
        assert_eq!(tree[0].children[0].category.name, "Shirts");
        assert_eq!(tree[0].children[0].children[0].category.name, "Polo");
        assert!(tree[1].children.is_empty());
    }
}
