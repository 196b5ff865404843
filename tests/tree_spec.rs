use canopy::db::Database;
use canopy::models::*;
use canopy::registry::FeatureRegistry;
use canopy::tree::{AncestryError, AncestryResolver, PathResolver};
use serde_json::json;
use speculate2::speculate;

fn create_directory(db: &Database, parent: Option<&Directory>, title: &str) -> Directory {
    let attributes = json!({ "title": title }).as_object().cloned().expect("object");
    let directory = Directory::build(parent.map(|d| d.id), &attributes);
    db.insert_directory(directory, &FeatureRegistry::with_builtin_features().reserved_slugs())
        .expect("Failed to insert directory")
        .record
}

fn create_feature(db: &Database, kind: &str, parent: FeatureParent, title: &str) -> Feature {
    let attributes = json!({ "title": title }).as_object().cloned().expect("object");
    let feature = Feature::build(kind, &parent, &attributes);
    db.insert_feature(feature, &FeatureRegistry::with_builtin_features().reserved_slugs())
        .expect("Failed to insert feature")
        .record
}

fn slugs(directories: &[Directory]) -> Vec<&str> {
    directories.iter().map(|d| d.slug.as_str()).collect()
}

speculate! {
    before {
        let db = Database::open_memory().expect("Failed to create in-memory database");
        db.migrate().expect("Failed to run migrations");

        let weapons = create_directory(&db, None, "Weapons");
        let bows = create_directory(&db, Some(&weapons), "Bows");
        let arbalests = create_directory(&db, Some(&bows), "Arbalests");
        let resolver = AncestryResolver::new(&db);
    }

    describe "AncestryResolver::resolve" {
        it "returns the full chain root first" {
            let chain = resolver.resolve(&["weapons", "bows", "arbalests"]).expect("Resolve failed");
            assert_eq!(slugs(&chain), vec!["weapons", "bows", "arbalests"]);
            assert_eq!(chain[2].id, arbalests.id);
        }

        it "reports the matched prefix and the missing remainder" {
            match resolver.resolve(&["weapons", "bows", "missing"]) {
                Err(AncestryError::NotFound { search, found, missing }) => {
                    assert_eq!(search, "weapons/bows/missing");
                    assert_eq!(slugs(&found), vec!["weapons", "bows"]);
                    assert_eq!(missing, vec!["missing".to_string()]);
                }
                other => panic!("expected NotFound, got {:?}", other),
            }
        }

        it "stops at the first miss" {
            match resolver.resolve(&["weapons", "swords", "arbalests"]) {
                Err(AncestryError::NotFound { found, missing, .. }) => {
                    assert_eq!(slugs(&found), vec!["weapons"]);
                    assert_eq!(missing, vec!["swords".to_string(), "arbalests".to_string()]);
                }
                other => panic!("expected NotFound, got {:?}", other),
            }
        }

        it "only looks among direct children" {
            let result = resolver.resolve(&["weapons", "arbalests"]);
            assert!(matches!(result, Err(AncestryError::NotFound { .. })));
        }

        it "rejects an empty path as malformed" {
            let empty: [&str; 0] = [];
            assert!(matches!(resolver.resolve(&empty), Err(AncestryError::MalformedRequest)));
        }

        it "accounts for every segment" {
            let candidates: Vec<Vec<&str>> = vec![
                vec!["weapons"],
                vec!["bows"],
                vec!["weapons", "bows"],
                vec!["weapons", "bows", "arbalests", "bolts"],
                vec!["armour", "bows"],
                vec!["weapons", "bows", "arbalests"],
                vec!["weapons", "weapons"],
            ];

            for seq in candidates {
                match resolver.resolve(&seq) {
                    Ok(chain) => assert_eq!(slugs(&chain), seq),
                    Err(AncestryError::NotFound { found, missing, .. }) => {
                        assert_eq!(found.len() + missing.len(), seq.len());
                        assert_eq!(slugs(&found), seq[..found.len()].to_vec());
                        assert_eq!(missing, seq[found.len()..].iter().map(|s| s.to_string()).collect::<Vec<_>>());
                        assert!(!missing.is_empty());
                    }
                    Err(other) => panic!("unexpected error {:?}", other),
                }
            }
        }
    }

    describe "AncestryResolver::walk" {
        it "treats the empty path as the root" {
            let empty: [&str; 0] = [];
            let ancestry = resolver.walk(&empty).expect("Walk failed");
            assert!(ancestry.found.is_empty());
            assert!(ancestry.is_complete());
        }
    }

    describe "PathResolver" {
        it "continues into features and nested features" {
            let blog = create_feature(&db, "Blog", FeatureParent::Directory(Some(bows.clone())), "News");
            let post = create_feature(&db, "BlogPost", FeatureParent::Feature(blog.clone()), "Restock");

            let resolved = canopy::tree::PathResolver::new(&db)
                .resolve(&["weapons", "bows", "news", "restock"])
                .expect("Resolve failed");

            assert!(resolved.is_complete());
            assert_eq!(slugs(&resolved.directories), vec!["weapons", "bows"]);
            assert_eq!(resolved.features.iter().map(|f| f.id).collect::<Vec<_>>(), vec![blog.id, post.id]);
            assert_eq!(resolved.parent(), FeatureParent::Feature(post));
        }

        it "keeps the unmatched tail after a feature" {
            create_feature(&db, "Page", FeatureParent::Directory(Some(weapons.clone())), "About");

            let resolved = canopy::tree::PathResolver::new(&db)
                .resolve(&["weapons", "about", "team", "history"])
                .expect("Resolve failed");

            assert_eq!(resolved.features.len(), 1);
            assert_eq!(resolved.missing, vec!["team".to_string(), "history".to_string()]);
            assert_eq!(resolved.directory_path(), "/weapons");
        }

        it "resolves root features" {
            create_feature(&db, "Page", FeatureParent::Directory(None), "Index");

            let resolved = canopy::tree::PathResolver::new(&db).resolve(&["index"]).expect("Resolve failed");
            assert!(resolved.directories.is_empty());
            assert_eq!(resolved.feature().map(|f| f.slug.as_str()), Some("index"));
            assert_eq!(resolved.directory_path(), "/");
        }
    }
}
