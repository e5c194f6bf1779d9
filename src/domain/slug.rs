
use crate::error::{AppError, AppResult};

/// Suffixes tried before giving up on a name.
pub const MAX_ATTEMPTS: u32 = 50;

const FOLDS: &[(&str, char)] = &[
    ("àáảãạăằắẳẵặâầấẩẫậ", 'a'),
    ("èéẻẽẹêềếểễệ", 'e'),
    ("ìíỉĩị", 'i'),
    ("òóỏõọôồốổỗộơờớởỡợ", 'o'),
    ("ùúủũụưừứửữự", 'u'),
    ("ỳýỷỹỵ", 'y'),
    ("đ", 'd'),
];

fn fold(c: char) -> char {
    FOLDS
        .iter()
        .find(|(group, _)| group.contains(c))
        .map(|(_, base)| *base)
        .unwrap_or(c)
}

/// Decomposed input carries its accents as U+0300..U+036F.
fn is_combining_mark(c: char) -> bool {
    ('\u{0300}'..='\u{036F}').contains(&c)
}

/// Lower-case, ASCII, hyphen separated. Vietnamese diacritics are folded
/// ("Cà phê sữa đá" -> "ca-phe-sua-da").
pub fn slugify(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut pending_dash = false;
    for c in input.chars().flat_map(char::to_lowercase).map(fold) {
        if is_combining_mark(c) {
            continue;
        }
        if c.is_ascii_alphanumeric() {
            if pending_dash && !out.is_empty() {
                out.push('-');
            }
            pending_dash = false;
            out.push(c);
        } else {
            pending_dash = true;
        }
    }
    out
}

/// `base`, then `base-2`, `base-3`, ...
pub fn candidate(base: &str, attempt: u32) -> String {
    if attempt <= 1 {
        base.to_string()
    } else {
        format!("{base}-{attempt}")
    }
}

/// Slug for `name` that `is_taken` reports free, trying `base`, `base-2`, ...
pub async fn first_free<F, Fut>(name: &str, mut is_taken: F) -> AppResult<String>
where
    F: FnMut(String) -> Fut,
    Fut: Future<Output = AppResult<bool>>,
{
    let base = slugify(name);
    if base.is_empty() {
        return Err(AppError::BadRequest("name must contain letters or digits".into()));
    }
    for attempt in 1..=MAX_ATTEMPTS {
        let slug = candidate(&base, attempt);
        if !is_taken(slug.clone()).await? {
            return Ok(slug);
        }
    }
    Err(AppError::Conflict(format!("Too many entries named {name}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn folds_vietnamese() {
        assert_eq!(slugify("Cà phê sữa đá"), "ca-phe-sua-da");
        assert_eq!(slugify("Trà Ô Long Đặc Biệt"), "tra-o-long-dac-biet");
    }

    #[test]
    fn decomposed_accents_are_dropped() {
        assert_eq!(slugify("Vie\u{0323}t Nam"), "viet-nam");
        assert_eq!(slugify("Ca\u{0300} phe\u{0302} su\u{031B}\u{0303}a"), "ca-phe-sua");
    }

    #[test]
    fn collapses_separators() {
        assert_eq!(slugify("  Ethiopia -- Yirgacheffe (250g)!! "), "ethiopia-yirgacheffe-250g");
        assert_eq!(slugify("***"), "");
    }

    #[test]
    fn candidates_are_suffixed() {
        assert_eq!(candidate("arabica", 1), "arabica");
        assert_eq!(candidate("arabica", 3), "arabica-3");
    }

    #[tokio::test]
    async fn first_free_skips_taken_slugs() {
        let taken = ["arabica", "arabica-2"];
        let slug = first_free("Arabica", |c| {
            let hit = taken.contains(&c.as_str());
            async move { Ok::<_, AppError>(hit) }
        })
        .await
        .unwrap();
        assert_eq!(slug, "arabica-3");

        let err = first_free("Arabica", |_| async { Ok::<_, AppError>(true) })
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));

        let err = first_free("***", |_| async { Ok::<_, AppError>(false) })
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }
}
