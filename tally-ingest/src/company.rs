//! Company (tenant) list parser.

use tracing::error;
use tracing::info;

use crate::CompanyRecord;
use crate::text::clean_text;
use crate::text::parse_business_date;
use crate::xml;

/// Parse the upstream company-collection response into tenant records.
#[must_use]
pub fn parse_companies(xml_content: &str) -> Vec<CompanyRecord> {
    let root = match xml::parse_document(xml_content) {
        Ok(root) => root,
        Err(err) => {
            error!("company list parse failed: {err}");
            return Vec::new();
        }
    };

    let rows: Vec<CompanyRecord> = root
        .descendants("COMPANY")
        .into_iter()
        .map(|company| CompanyRecord {
            guid: clean_text(&company.child_text_or("GUID", "")),
            name: clean_text(&company.child_text_or("NAME", "")),
            formal_name: clean_text(&company.child_text_or("BASICCOMPANYFORMALNAME", "")),
            company_number: clean_text(&company.child_text_or("COMPANYNUMBER", "")),
            starting_from: parse_business_date(&company.child_text_or("STARTINGFROM", "")),
            books_from: parse_business_date(&company.child_text_or("BOOKSFROM", "")),
            audited_upto: parse_business_date(&company.child_text_or("AUDITEDUPTO", "")),
        })
        .collect();
    info!("found {} companies", rows.len());
    rows
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use pretty_assertions::assert_eq;

    #[test]
    fn parses_company_collection() {
        let rows = parse_companies(
            "<ENVELOPE><COMPANY><GUID>co-1</GUID><NAME>Demo Co</NAME>\
             <STARTINGFROM>20230401</STARTINGFROM><BOOKSFROM>20230401</BOOKSFROM>\
             </COMPANY><COMPANY><GUID>co-2</GUID><NAME>Other Co</NAME></COMPANY></ENVELOPE>",
        );
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].name, "Demo Co");
        assert_eq!(
            rows[0].starting_from,
            NaiveDate::from_ymd_opt(2023, 4, 1)
        );
        assert_eq!(rows[1].starting_from, None);
    }
}
