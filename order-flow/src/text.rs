//! Text normalisation shared by the matchers.

/// Lowercases and strips Spanish diacritics so "Azúcar" and "azucar" compare equal.
pub fn fold(text: &str) -> String {
    text.chars()
        .flat_map(char::to_lowercase)
        .map(|c| match c {
            'á' | 'à' | 'ä' | 'â' => 'a',
            'é' | 'è' | 'ë' | 'ê' => 'e',
            'í' | 'ì' | 'ï' | 'î' => 'i',
            'ó' | 'ò' | 'ö' | 'ô' => 'o',
            'ú' | 'ù' | 'ü' | 'û' => 'u',
            'ñ' => 'n',
            other => other,
        })
        .collect()
}

/// Splits already-folded text into alphanumeric words.
pub fn words(folded: &str) -> Vec<String> {
    folded
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_string)
        .collect()
}

const FILLER: &[&str] = &[
    "de", "del", "la", "las", "el", "los", "un", "una", "the", "of", "a", "an", "x",
];

/// Whether a customer's product phrase refers to a catalog product name.
///
/// A plain case-insensitive substring match is tried first. Failing that, every
/// meaningful word of the phrase has to appear in the name, allowing for Spanish
/// and English plurals ("aceites marolio" matches "Aceite Marolio 900ml").
pub fn phrase_matches(phrase: &str, name: &str) -> bool {
    let phrase = fold(phrase.trim());
    if phrase.is_empty() {
        return false;
    }
    let name = fold(name);
    if name.contains(&phrase) {
        return true;
    }

    let name_words = words(&name);
    let phrase_words: Vec<String> = words(&phrase)
        .into_iter()
        .filter(|w| !FILLER.contains(&w.as_str()))
        .collect();

    !phrase_words.is_empty()
        && phrase_words
            .iter()
            .all(|w| singular_forms(w).iter().any(|f| name_words.contains(f)))
}

fn singular_forms(word: &str) -> Vec<String> {
    let mut forms = vec![word.to_string()];
    if word.len() > 4 {
        if let Some(stem) = word.strip_suffix("es") {
            forms.push(stem.to_string());
        }
    }
    if word.len() > 3 {
        if let Some(stem) = word.strip_suffix('s') {
            forms.push(stem.to_string());
        }
    }
    forms
}
