//! Derives searchable labels from an analysis.

use crate::types::{AnalysisResult, Tag, TagCategory};

/// Build the tag set for one analysed image.
///
/// Labels are lower-cased and trimmed; blank labels are dropped. Every tag
/// carries the analysis confidence.
pub fn derive_tags(image_id: i64, analysis: &AnalysisResult) -> Vec<Tag> {
    let groups: [(TagCategory, &[String]); 4] = [
        (TagCategory::Object, analysis.objects.as_slice()),
        (TagCategory::Person, analysis.people.as_slice()),
        (TagCategory::Scene, std::slice::from_ref(&analysis.scene_type)),
        (TagCategory::Activity, analysis.activities.as_slice()),
    ];

    groups
        .iter()
        .flat_map(|(category, labels)| labels.iter().map(move |label| (*category, label)))
        .filter_map(|(category, label)| {
            let name = normalize(label)?;
            Some(Tag {
                image_id,
                name,
                category,
                confidence: analysis.confidence,
            })
        })
        .collect()
}

/// Canonical form of a label, `None` when nothing is left
pub fn normalize(label: &str) -> Option<String> {
    let name = label.trim().to_lowercase();
    if name.is_empty() {
        None
    } else {
        Some(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(objects: &[&str], people: &[&str], scene: &str, activities: &[&str]) -> AnalysisResult {
        let owned = |items: &[&str]| items.iter().map(|s| s.to_string()).collect();
        AnalysisResult {
            description: String::new(),
            objects: owned(objects),
            people: owned(people),
            scene_type: scene.to_string(),
            activities: owned(activities),
            confidence: 0.7,
        }
    }

    #[test]
    fn test_tags_are_normalized() {
        let tags = derive_tags(5, &result(&["Dog", " cat "], &[], "Outdoor", &[]));

        let labels: Vec<(&str, TagCategory)> =
            tags.iter().map(|t| (t.name.as_str(), t.category)).collect();
        assert_eq!(
            labels,
            vec![
                ("dog", TagCategory::Object),
                ("cat", TagCategory::Object),
                ("outdoor", TagCategory::Scene),
            ]
        );
        assert!(tags.iter().all(|t| t.image_id == 5 && t.confidence == 0.7));
    }

    #[test]
    fn test_every_category_is_covered() {
        let tags = derive_tags(1, &result(&["ball"], &["Child"], "park", &["Playing"]));
        let categories: Vec<TagCategory> = tags.iter().map(|t| t.category).collect();
        assert_eq!(
            categories,
            vec![
                TagCategory::Object,
                TagCategory::Person,
                TagCategory::Scene,
                TagCategory::Activity,
            ]
        );
        assert_eq!(tags[3].name, "playing");
    }

    #[test]
    fn test_blank_labels_are_dropped() {
        let tags = derive_tags(1, &result(&["", "   "], &[], "", &[]));
        assert!(tags.is_empty());
    }
}
