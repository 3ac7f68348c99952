// src/services/spreadsheet.rs
//
// Leitura da planilha CSV de inventário.

use chrono::NaiveDate;

use crate::{
    common::error::{AppError, RowProblem, SpreadsheetRowError},
    models::stock::{ObservedBatch, ObservedProduct},
};

pub const STOCK_TAKING_COLUMNS: [&str; 5] = [
    "product_id",
    "batch_no",
    "product_quantity",
    "manufacture_date",
    "expire_date",
];

const DATE_FORMAT: &str = "%Y-%m-%d";

// Mesmo limite dos payloads JSON e das colunas VARCHAR(64)
pub const MAX_KEY_CHARS: usize = 64;

/// Converte a planilha em produtos observados, agrupados na ordem em que aparecem.
/// Qualquer linha inválida rejeita o arquivo inteiro, listando todas as linhas com problema.
pub fn parse_stock_taking_csv(text: &str) -> Result<Vec<ObservedProduct>, AppError> {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(text.as_bytes());

    let header = reader
        .headers()
        .map_err(|e| AppError::SpreadsheetHeader { found: e.to_string() })?
        .clone();
    let found: Vec<&str> = header.iter().collect();
    if found != STOCK_TAKING_COLUMNS {
        return Err(AppError::SpreadsheetHeader { found: found.join(",") });
    }

    let mut products: Vec<ObservedProduct> = Vec::new();
    let mut problems = Vec::new();

    for result in reader.records() {
        let record = match result {
            Ok(record) => record,
            Err(e) => {
                let line = e.position().map(|p| p.line()).unwrap_or(0);
                problems.push(SpreadsheetRowError {
                    line,
                    column: None,
                    problem: RowProblem::Unreadable,
                    value: e.to_string(),
                });
                continue;
            }
        };

        // ",,,," conta como linha em branco
        if record.iter().all(str::is_empty) {
            continue;
        }

        let line = record.position().map(|p| p.line()).unwrap_or(0);
        match parse_row(line, &record) {
            Ok((product_id, batch)) => {
                match products.iter_mut().find(|p| p.product_id == product_id) {
                    Some(product) => product.batches.push(batch),
                    None => products.push(ObservedProduct {
                        product_id,
                        batches: vec![batch],
                    }),
                }
            }
            Err(mut row_problems) => problems.append(&mut row_problems),
        }
    }

    if !problems.is_empty() {
        tracing::warn!(rows = problems.len(), "📄 Planilha de inventário rejeitada");
        return Err(AppError::SpreadsheetRows(problems));
    }
    if products.is_empty() {
        return Err(AppError::EmptySubmission);
    }

    Ok(products)
}

fn parse_row(
    line: u64,
    record: &csv::StringRecord,
) -> Result<(String, ObservedBatch), Vec<SpreadsheetRowError>> {
    if record.len() != STOCK_TAKING_COLUMNS.len() {
        return Err(vec![SpreadsheetRowError {
            line,
            column: None,
            problem: RowProblem::WrongColumnCount,
            value: record.len().to_string(),
        }]);
    }

    let mut problems = Vec::new();
    let cell = |index: usize| record.get(index).unwrap_or_default();
    let mut report = |column: &'static str, problem: RowProblem, value: &str| {
        problems.push(SpreadsheetRowError {
            line,
            column: Some(column),
            problem,
            value: value.to_string(),
        });
    };

    let mut check_key = |column: &'static str, value: &str| {
        if value.is_empty() {
            report(column, RowProblem::MissingValue, value);
        } else if value.chars().count() > MAX_KEY_CHARS {
            report(column, RowProblem::TooLong, value);
        }
    };
    let product_id = cell(0);
    check_key("product_id", product_id);
    let batch_no = cell(1);
    check_key("batch_no", batch_no);

    let raw_quantity = cell(2);
    let quantity = if raw_quantity.is_empty() {
        report("product_quantity", RowProblem::MissingValue, raw_quantity);
        None
    } else {
        match raw_quantity.parse::<i64>() {
            Ok(q) if q < 0 => {
                report("product_quantity", RowProblem::NegativeQuantity, raw_quantity);
                None
            }
            Ok(q) => Some(q),
            Err(_) => {
                report("product_quantity", RowProblem::NotAnInteger, raw_quantity);
                None
            }
        }
    };

    let mut parse_date = |column: &'static str, raw: &str| -> Option<NaiveDate> {
        if raw.is_empty() {
            return None;
        }
        NaiveDate::parse_from_str(raw, DATE_FORMAT)
            .map_err(|_| report(column, RowProblem::InvalidDate, raw))
            .ok()
    };
    let manufacture_date = parse_date("manufacture_date", cell(3));
    let expire_date = parse_date("expire_date", cell(4));

    if let (Some(made), Some(expires)) = (manufacture_date, expire_date) {
        if expires < made {
            report("expire_date", RowProblem::DatesOutOfOrder, cell(4));
        }
    }

    match quantity {
        Some(quantity) if problems.is_empty() => Ok((
            product_id.to_string(),
            ObservedBatch {
                batch_no: batch_no.to_string(),
                quantity,
                manufacture_date,
                expire_date,
            },
        )),
        _ => Err(problems),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str = "product_id,batch_no,product_quantity,manufacture_date,expire_date";

    fn rows_of(err: AppError) -> Vec<SpreadsheetRowError> {
        match err {
            AppError::SpreadsheetRows(rows) => rows,
            other => panic!("esperava SpreadsheetRows, veio {other:?}"),
        }
    }

    #[test]
    fn groups_rows_by_product_in_order_of_appearance() {
        let text = format!(
            "{HEADER}\nMED002,X1,3,,\nMED001,B1,80,2025-01-10,2027-01-10\n\nMED002,X2,0,,2026-12-31\n"
        );

        let products = parse_stock_taking_csv(&text).unwrap();

        assert_eq!(products.len(), 2);
        assert_eq!(products[0].product_id, "MED002");
        assert_eq!(products[0].batches.len(), 2);
        assert_eq!(products[0].batches[1].quantity, 0);
        assert_eq!(products[1].batches[0].quantity, 80);
        assert_eq!(
            products[1].batches[0].expire_date,
            NaiveDate::from_ymd_opt(2027, 1, 10)
        );
    }

    #[test]
    fn tolerates_bom_whitespace_and_empty_rows() {
        let text = format!("\u{feff}{HEADER}\n ,,,, \n MED001 , B1 , 12 , , \n");

        let products = parse_stock_taking_csv(&text).unwrap();

        assert_eq!(products[0].product_id, "MED001");
        assert_eq!(products[0].batches[0].batch_no, "B1");
        assert_eq!(products[0].batches[0].manufacture_date, None);
    }

    #[test]
    fn rejects_unexpected_header() {
        let err = parse_stock_taking_csv("product,batch,qty\nMED001,B1,1\n").unwrap_err();
        assert!(matches!(err, AppError::SpreadsheetHeader { found } if found == "product,batch,qty"));
    }

    #[test]
    fn reports_every_bad_row_with_its_line() {
        let text = format!(
            "{HEADER}\nMED001,B1,ten,,\nMED001,B2,5,2025-13-01,\nMED002,B1,-4,,\nMED003,,1,,\nMED004,B1,1\nMED005,B1,1,2026-01-01,2025-01-01\nMED006,B1,7,,\n"
        );

        let rows = rows_of(parse_stock_taking_csv(&text).unwrap_err());

        let summary: Vec<(u64, RowProblem)> = rows.iter().map(|r| (r.line, r.problem)).collect();
        assert_eq!(
            summary,
            vec![
                (2, RowProblem::NotAnInteger),
                (3, RowProblem::InvalidDate),
                (4, RowProblem::NegativeQuantity),
                (5, RowProblem::MissingValue),
                (6, RowProblem::WrongColumnCount),
                (7, RowProblem::DatesOutOfOrder),
            ]
        );
        assert_eq!(rows[0].column, Some("product_quantity"));
        assert_eq!(rows[0].value, "ten");
    }

    #[test]
    fn keys_longer_than_the_column_are_rejected() {
        let long_id = "M".repeat(MAX_KEY_CHARS + 1);
        let edge_batch = "B".repeat(MAX_KEY_CHARS);
        let text = format!("{HEADER}\n{long_id},B1,3,,\nMED001,{edge_batch},4,,\n");

        let rows = rows_of(parse_stock_taking_csv(&text).unwrap_err());

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].line, 2);
        assert_eq!(rows[0].column, Some("product_id"));
        assert_eq!(rows[0].problem, RowProblem::TooLong);
    }

    #[test]
    fn header_only_file_is_empty() {
        let err = parse_stock_taking_csv(&format!("{HEADER}\n")).unwrap_err();
        assert!(matches!(err, AppError::EmptySubmission));
    }
}
