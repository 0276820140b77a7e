use std::collections::HashSet;

/// Tags present at the source but missing at the destination, in source order.
///
/// Source duplicates of a missing tag are kept as they appear.
pub fn missing_tags(source: &[String], destination: &[String]) -> Vec<String> {
    let present: HashSet<&str> = destination.iter().map(String::as_str).collect();

    source
        .iter()
        .filter(|tag| !present.contains(tag.as_str()))
        .cloned()
        .collect()
}
