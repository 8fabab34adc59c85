//! Source-language detection used to skip texts already in the target language.

/// Detects the dominant language of `text` using whatlang.
/// Returns an ISO 639-1 code, or None when detection is unreliable or the
/// language has no mapping.
pub fn detect_language(text: &str) -> Option<&'static str> {
    let info = whatlang::detect(text)?;
    if !info.is_reliable() {
        return None;
    }
    lang_to_code(info.lang())
}

fn lang_to_code(lang: whatlang::Lang) -> Option<&'static str> {
    use whatlang::Lang::*;
    let code = match lang {
        Eng => "en",
        Cmn => "zh",
        Jpn => "ja",
        Kor => "ko",
        Fra => "fr",
        Deu => "de",
        Spa => "es",
        Rus => "ru",
        Por => "pt",
        Ita => "it",
        Ara => "ar",
        Hin => "hi",
        Tur => "tr",
        Vie => "vi",
        Tha => "th",
        Nld => "nl",
        Pol => "pl",
        Ukr => "uk",
        _ => return None,
    };
    Some(code)
}

/// Primary subtag of a language tag: `zh-CN` and `zh_TW` both become `zh`.
pub fn primary_subtag(tag: &str) -> String {
    tag.split(['-', '_'])
        .next()
        .unwrap_or(tag)
        .trim()
        .to_ascii_lowercase()
}

/// True when `text` is confidently detected as `target_lang` already.
/// Undetermined text is never skipped.
pub fn already_in_target(text: &str, target_lang: &str) -> bool {
    detect_language(text).is_some_and(|code| code == primary_subtag(target_lang))
}

#[cfg(test)]
mod tests {
    use super::*;

    const ENGLISH: &str = "This function reads the configuration file from disk and returns \
        the parsed settings, falling back to the defaults when the file does not exist.";
    const CHINESE: &str = "这个函数从磁盘读取配置文件并返回解析后的设置，如果文件不存在则使用默认值。";

    #[test]
    fn detects_common_languages() {
        assert_eq!(detect_language(ENGLISH), Some("en"));
        assert_eq!(detect_language(CHINESE), Some("zh"));
    }

    #[test]
    fn region_tags_match_primary_language() {
        assert_eq!(primary_subtag("zh-CN"), "zh");
        assert_eq!(primary_subtag("pt_BR"), "pt");
        assert_eq!(primary_subtag("EN"), "en");
        assert!(already_in_target(CHINESE, "zh-CN"));
        assert!(!already_in_target(ENGLISH, "zh"));
    }

    #[test]
    fn undetermined_text_is_translated() {
        assert!(!already_in_target("x = 1", "en"));
        assert!(!already_in_target("", "en"));
    }
}
