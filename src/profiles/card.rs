use crate::db::Profile;

/// Profile as shown to other users in the feed.
pub fn profile_card(p: &Profile, now: i64) -> String {
    let mut lines = vec![
        format!("Name: {}", p.name),
        format!("Gender: {}", p.gender),
        format!("Age: {}", p.age),
        format!("City: {}", p.city.as_deref().unwrap_or("")),
        format!("About: {}", p.bio.as_deref().unwrap_or("")),
    ];
    if p.boosted_until.is_some_and(|until| until >= now) {
        lines.push("🚀 Boosted".to_owned());
    }
    lines.join("\n")
}

/// Profile as shown to its owner.
pub fn own_profile(p: &Profile) -> String {
    [
        format!("Name: {}", p.name),
        format!("Gender: {}", p.gender),
        format!("Age: {}", p.age),
        format!("City: {}", p.city.as_deref().unwrap_or("")),
        format!("About: {}", p.bio.as_deref().unwrap_or("")),
        format!("Active: {}", if p.active { "yes" } else { "no" }),
    ]
    .join("\n")
}
