//! `lexrag classify`: Show how a query is classified.

use lexrag_classifier::{ClassificationReport, classify_detailed};
use lexrag_core::{Entities, RegistrationKind};

pub fn run(query: &str, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let report = classify_detailed(query);
    if json {
        println!("{}", serde_json::to_string_pretty(&report.classification)?);
    } else {
        print!("{}", describe(&report));
    }
    Ok(())
}

fn describe(report: &ClassificationReport) -> String {
    let c = &report.classification;
    let mut out = format!("Type:      {}\n", c.query_type());

    match c.entities() {
        Entities::CaseNumber(number) => {
            out.push_str(&format!("Raw:       {}\n", number.raw));
            out.push_str(&format!("Variants:  {}, {}\n", number.cyrillic(), number.latin()));
        }
        Entities::Company(company) => {
            if let Some(name) = &company.name {
                out.push_str(&format!("Company:   {name}\n"));
            }
            if let Some(reg) = &company.registration {
                let label = match reg.kind {
                    RegistrationKind::Inn => "ИНН",
                    RegistrationKind::Ogrn => "ОГРН",
                    RegistrationKind::Ogrnip => "ОГРНИП",
                };
                out.push_str(&format!("Reg. no.:  {label} {}\n", reg.value));
            }
        }
        Entities::DocType(doc) => out.push_str(&format!("Doc type:  {}\n", doc.phrase)),
        Entities::None => {}
    }

    if report.is_ambiguous() {
        let matched: Vec<String> = report.matched.iter().map(|t| t.to_string()).collect();
        out.push_str(&format!("Also matched: {}\n", matched.join(", ")));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn describes_case_number() {
        let text = describe(&classify_detailed("Дело №А65-28469/12"));
        assert!(text.contains("case_number"));
        assert!(text.contains("А65-28469/2012, A65-28469/2012"));
    }

    #[test]
    fn describes_company() {
        let text = describe(&classify_detailed("ООО Ромашка банкротство"));
        assert!(text.contains("Company:   ООО Ромашка"));
    }

    #[test]
    fn free_text_has_no_entities() {
        let text = describe(&classify_detailed("как взыскать неустойку"));
        assert_eq!(text, "Type:      free_text\n");
    }
}
