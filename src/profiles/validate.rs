use crate::db::Gender;

pub const MIN_AGE: u8 = 18;
pub const MAX_AGE: u8 = 100;

/// Maps the accepted spellings, in either supported language, to a gender.
pub fn parse_gender(raw: &str) -> Option<Gender> {
    match raw.trim().to_lowercase().as_str() {
        "male" | "man" | "m" | "мужской" | "мужчина" => Some(Gender::Male),
        "female" | "woman" | "f" | "женский" | "женщина" => Some(Gender::Female),
        "other" | "другое" => Some(Gender::Other),
        _ => None,
    }
}

pub fn parse_age(raw: &str) -> Option<u8> {
    raw.trim()
        .parse::<u8>()
        .ok()
        .filter(|age| (MIN_AGE..=MAX_AGE).contains(age))
}

pub fn non_empty(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gender_vocabulary() {
        assert_eq!(parse_gender(" Female "), Some(Gender::Female));
        assert_eq!(parse_gender("Мужской"), Some(Gender::Male));
        assert_eq!(parse_gender("другое"), Some(Gender::Other));
        assert_eq!(parse_gender("yes"), None);
        assert_eq!(parse_gender(""), None);
    }

    #[test]
    fn age_bounds() {
        assert_eq!(parse_age("18"), Some(18));
        assert_eq!(parse_age(" 100 "), Some(100));
        assert_eq!(parse_age("17"), None);
        assert_eq!(parse_age("101"), None);
        assert_eq!(parse_age("300"), None);
        assert_eq!(parse_age("-20"), None);
        assert_eq!(parse_age("twenty"), None);
    }

    #[test]
    fn blank_text_is_rejected() {
        assert_eq!(non_empty("  Paris "), Some("Paris".to_owned()));
        assert_eq!(non_empty(" \n\t"), None);
    }
}
