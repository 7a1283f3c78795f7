//! Document-type detection against a fixed vocabulary of legal forms.

/// Phrases naming procedural and contractual documents, in tie-break order.
///
/// Entries are lowercase with `ё` already folded to `е`. Only compound
/// phrases are listed; bare words like "договор" match too much ordinary
/// prose to be useful as a signal.
pub const DOC_TYPE_VOCABULARY: &[&str] = &[
    "исковое заявление",
    "заявление о банкротстве",
    "заявление о признании должника банкротом",
    "заявление о выдаче судебного приказа",
    "заявление о вынесении судебного приказа",
    "заявление об обеспечении иска",
    "заявление о взыскании судебных расходов",
    "заявление о пересмотре по вновь открывшимся обстоятельствам",
    "апелляционная жалоба",
    "кассационная жалоба",
    "надзорная жалоба",
    "частная жалоба",
    "отзыв на исковое заявление",
    "отзыв на апелляционную жалобу",
    "отзыв на кассационную жалобу",
    "отзыв на иск",
    "возражение на исковое заявление",
    "встречное исковое заявление",
    "мировое соглашение",
    "ходатайство об отложении",
    "ходатайство о назначении экспертизы",
    "ходатайство о восстановлении срока",
    "ходатайство об истребовании доказательств",
    "претензионное письмо",
    "досудебная претензия",
    "претензия о возврате",
    "договор поставки",
    "договор подряда",
    "договор аренды",
    "договор займа",
    "договор купли-продажи",
    "договор оказания услуг",
    "договор уступки",
    "доверенность на представление интересов",
    "акт сверки",
    "расчет задолженности",
    "расчет исковых требований",
    "жалоба на действия судебного пристава",
];

/// Lowercase and fold `ё` into `е`.
pub fn fold(text: &str) -> String {
    text.to_lowercase().replace('ё', "е")
}

/// The longest vocabulary phrase occurring in `text`.
///
/// Equal-length matches resolve to the earlier vocabulary entry.
pub fn detect_doc_type(text: &str) -> Option<&'static str> {
    let folded = fold(text);
    let mut best: Option<&'static str> = None;
    for &phrase in DOC_TYPE_VOCABULARY {
        if !folded.contains(phrase) {
            continue;
        }
        let longer = best.is_none_or(|b| phrase.chars().count() > b.chars().count());
        if longer {
            best = Some(phrase);
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_case_insensitively() {
        assert_eq!(
            detect_doc_type("Образец: Исковое Заявление о взыскании долга"),
            Some("исковое заявление")
        );
    }

    #[test]
    fn longest_phrase_wins() {
        assert_eq!(
            detect_doc_type("нужен отзыв на исковое заявление"),
            Some("отзыв на исковое заявление")
        );
        assert_eq!(
            detect_doc_type("встречное исковое заявление образец"),
            Some("встречное исковое заявление")
        );
    }

    #[test]
    fn yo_is_folded() {
        assert_eq!(
            detect_doc_type("Расчёт задолженности по договору"),
            Some("расчет задолженности")
        );
        assert_eq!(
            detect_doc_type("ВОЗРАЖЕНИЕ НА ИСКОВОЕ ЗАЯВЛЕНИЕ"),
            Some("возражение на исковое заявление")
        );
    }

    #[test]
    fn vocabulary_is_normalized() {
        for phrase in DOC_TYPE_VOCABULARY {
            assert_eq!(fold(phrase), *phrase);
        }
    }

    #[test]
    fn no_match_on_plain_question() {
        assert_eq!(detect_doc_type("как взыскать неустойку"), None);
    }
}
