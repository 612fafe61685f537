// SPDX-FileCopyrightText: 2026 Kiosk Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Catalog file parsing.
//!
//! The catalog is a tabular file with case-insensitive column headers.
//! Required columns: `id`, `product name`, `category 1`, `article`.
//! Optional: `description`, `category 2`, `category 3`, `photo_url`,
//! `page_url`. Any other columns are ignored. Empty optional values become
//! absent, not empty strings.

use std::collections::HashMap;
use std::path::Path;

use kiosk_core::{KioskError, Product};
use tracing::warn;

const REQUIRED_COLUMNS: &[&str] = &["id", "product name", "category 1", "article"];

/// Load catalog rows from a CSV file. Rows missing a required value are
/// skipped with a warning; a missing required column fails the whole load.
pub fn load_products(path: &Path) -> Result<Vec<Product>, KioskError> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|e| KioskError::Validation(format!("cannot read catalog file: {e}")))?;

    let headers = reader
        .headers()
        .map_err(|e| KioskError::Validation(format!("cannot read catalog headers: {e}")))?
        .clone();
    let columns = column_positions(&headers);

    for required in REQUIRED_COLUMNS {
        if !columns.contains_key(*required) {
            return Err(KioskError::Validation(format!(
                "catalog file is missing required column {required:?}"
            )));
        }
    }

    let mut products = Vec::new();
    for (row_number, record) in reader.records().enumerate() {
        let record = match record {
            Ok(record) => record,
            Err(e) => {
                warn!(row = row_number + 2, error = %e, "skipping malformed catalog row");
                continue;
            }
        };
        match record_to_product(&record, &columns) {
            Some(product) => products.push(product),
            None => {
                warn!(row = row_number + 2, "skipping catalog row with missing required value");
            }
        }
    }
    Ok(products)
}

/// Map lowercased header names to their column positions.
fn column_positions(headers: &csv::StringRecord) -> HashMap<String, usize> {
    headers
        .iter()
        .enumerate()
        .map(|(index, name)| (name.trim().to_lowercase(), index))
        .collect()
}

fn field<'a>(
    record: &'a csv::StringRecord,
    columns: &HashMap<String, usize>,
    name: &str,
) -> Option<&'a str> {
    let value = record.get(*columns.get(name)?)?.trim();
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}

fn record_to_product(
    record: &csv::StringRecord,
    columns: &HashMap<String, usize>,
) -> Option<Product> {
    Some(Product {
        id: field(record, columns, "id")?.to_string(),
        product_name: field(record, columns, "product name")?.to_string(),
        category_1: field(record, columns, "category 1")?.to_string(),
        article: field(record, columns, "article")?.to_string(),
        description: field(record, columns, "description").map(String::from),
        category_2: field(record, columns, "category 2").map(String::from),
        category_3: field(record, columns, "category 3").map(String::from),
        photo_url: field(record, columns, "photo_url").map(String::from),
        page_url: field(record, columns, "page_url").map(String::from),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_catalog(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn headers_are_case_insensitive_and_extras_ignored() {
        let file = write_catalog(
            "ID,Product Name,Category 1,Article,Warehouse,Description\n\
             P-001,Ноутбук бизнес-класса,Электроника,DL001,MSK,14 дюймов\n",
        );
        let products = load_products(file.path()).unwrap();
        assert_eq!(products.len(), 1);
        assert_eq!(products[0].id, "P-001");
        assert_eq!(products[0].product_name, "Ноутбук бизнес-класса");
        assert_eq!(products[0].description.as_deref(), Some("14 дюймов"));
    }

    #[test]
    fn empty_optionals_become_none() {
        let file = write_catalog(
            "id,product name,category 1,article,category 2,photo_url\n\
             P-001,Болт М8,Крепёж,B-M8,, \n",
        );
        let products = load_products(file.path()).unwrap();
        assert_eq!(products[0].category_2, None);
        assert_eq!(products[0].photo_url, None);
    }

    #[test]
    fn rows_missing_required_values_are_skipped() {
        let file = write_catalog(
            "id,product name,category 1,article\n\
             P-001,Болт М8,Крепёж,B-M8\n\
             ,Гайка М8,Крепёж,N-M8\n\
             P-003,Шайба М8,Крепёж,\n",
        );
        let products = load_products(file.path()).unwrap();
        assert_eq!(products.len(), 1);
        assert_eq!(products[0].id, "P-001");
    }

    #[test]
    fn missing_required_column_fails_the_load() {
        let file = write_catalog("id,product name,category 1\nP-001,Болт М8,Крепёж\n");
        let err = load_products(file.path()).unwrap_err();
        assert!(err.to_string().contains("article"));
    }
}
