//! Customer form validation and sanitization.
//!
//! Validators are total functions over free text. [`validate_customer_form`]
//! accumulates every field error so a form can show them all at once; the
//! address is all-or-nothing: as soon as one address field is filled, the
//! four required ones are validated.

use crate::types::{Address, Customer, CustomerFormData, FieldError, FormField};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::LazyLock;

static EMAIL_PATTERN: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").ok());

static CANADIAN_POSTAL_PATTERN: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^[A-Z]\d[A-Z] ?\d[A-Z]\d$").ok());

static US_ZIP_PATTERN: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^\d{5}(-\d{4})?$").ok());

/// Highest quantity a single cart step may request.
pub const MAX_ITEM_QUANTITY: u32 = 99;

/// Which postal code syntax `zipCode` must follow.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PostalCodeFormat {
    /// `A1B 2C3`, space optional, case-insensitive
    #[default]
    Canadian,
    /// `12345` or `12345-6789`
    Us,
}

impl FromStr for PostalCodeFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "canadian" | "ca" => Ok(Self::Canadian),
            "us" | "zip" => Ok(Self::Us),
            other => Err(format!("unknown postal code format: {other}")),
        }
    }
}

fn matches(pattern: &LazyLock<Option<Regex>>, value: &str) -> bool {
    pattern.as_ref().is_some_and(|re| re.is_match(value))
}

fn trimmed_len(value: &str) -> usize {
    value.trim().chars().count()
}

fn digits(value: &str) -> String {
    value.chars().filter(char::is_ascii_digit).collect()
}

/// At least two characters after trimming.
#[must_use]
pub fn validate_name(name: &str) -> bool {
    trimmed_len(name) >= 2
}

/// `local@domain.tld` with no whitespace.
#[must_use]
pub fn validate_email(email: &str) -> bool {
    matches(&EMAIL_PATTERN, email)
}

/// Exactly ten digits once everything else is stripped.
#[must_use]
pub fn validate_phone(phone: &str) -> bool {
    digits(phone).len() == 10
}

/// At least three characters after trimming.
#[must_use]
pub fn validate_street(street: &str) -> bool {
    trimmed_len(street) >= 3
}

/// At least two characters after trimming.
#[must_use]
pub fn validate_city(city: &str) -> bool {
    trimmed_len(city) >= 2
}

/// At least two characters after trimming.
#[must_use]
pub fn validate_state(state: &str) -> bool {
    trimmed_len(state) >= 2
}

/// Checks a postal code against the configured format.
#[must_use]
pub fn validate_zip_code(zip_code: &str, format: PostalCodeFormat) -> bool {
    let clean = zip_code.trim().to_ascii_uppercase();
    match format {
        PostalCodeFormat::Canadian => matches(&CANADIAN_POSTAL_PATTERN, &clean),
        PostalCodeFormat::Us => matches(&US_ZIP_PATTERN, &clean),
    }
}

/// At least two characters after trimming.
#[must_use]
pub fn validate_country(country: &str) -> bool {
    trimmed_len(country) >= 2
}

/// Quantity a caller may pass for a single add: `1..=99`.
#[must_use]
pub fn validate_item_quantity(quantity: i64) -> bool {
    (1..=i64::from(MAX_ITEM_QUANTITY)).contains(&quantity)
}

/// Renders a ten-digit number as `(555) 123-4567`.
///
/// Only the first ten digits are considered; anything shorter is returned
/// unchanged.
#[must_use]
pub fn format_phone(phone: &str) -> String {
    let clean: String = digits(phone).chars().take(10).collect();
    if clean.len() == 10 {
        format!("({}) {}-{}", &clean[..3], &clean[3..6], &clean[6..])
    } else {
        phone.to_string()
    }
}

/// Whether any address field of the form has content.
#[must_use]
pub fn has_address_data(form: &CustomerFormData) -> bool {
    [&form.street, &form.city, &form.state, &form.zip_code, &form.country]
        .iter()
        .any(|field| !field.trim().is_empty())
}

/// Validates a checkout form; an empty result means it can be submitted.
#[must_use]
pub fn validate_customer_form(form: &CustomerFormData, postal: PostalCodeFormat) -> Vec<FieldError> {
    let mut errors = Vec::new();

    if form.name.trim().is_empty() {
        errors.push(FieldError::new(FormField::Name, "Name is required"));
    } else if !validate_name(&form.name) {
        errors.push(FieldError::new(
            FormField::Name,
            "Name must be at least 2 characters long",
        ));
    }

    let email = form.email.trim();
    let phone = form.phone.trim();

    if email.is_empty() && phone.is_empty() {
        errors.push(FieldError::new(
            FormField::General,
            "Either email or phone number is required",
        ));
    }
    if !email.is_empty() && !validate_email(email) {
        errors.push(FieldError::new(
            FormField::Email,
            "Please enter a valid email address",
        ));
    }
    if !phone.is_empty() && !validate_phone(phone) {
        errors.push(FieldError::new(
            FormField::Phone,
            "Please enter a valid phone number",
        ));
    }

    if has_address_data(form) {
        check_required(
            &mut errors,
            FormField::Street,
            &form.street,
            validate_street,
            "Street address is required when providing delivery address",
            "Street address must be at least 3 characters long",
        );
        check_required(
            &mut errors,
            FormField::City,
            &form.city,
            validate_city,
            "City is required when providing delivery address",
            "City must be at least 2 characters long",
        );
        check_required(
            &mut errors,
            FormField::State,
            &form.state,
            validate_state,
            "State/Province is required when providing delivery address",
            "State/Province must be at least 2 characters long",
        );
        check_required(
            &mut errors,
            FormField::ZipCode,
            &form.zip_code,
            |zip| validate_zip_code(zip, postal),
            "ZIP/Postal code is required when providing delivery address",
            "Please enter a valid ZIP/Postal code (e.g., 12345 or A1B 2C3)",
        );

        if !form.country.trim().is_empty() && !validate_country(&form.country) {
            errors.push(FieldError::new(
                FormField::Country,
                "Country must be at least 2 characters long",
            ));
        }
    }

    errors
}

fn check_required(
    errors: &mut Vec<FieldError>,
    field: FormField,
    value: &str,
    valid: impl Fn(&str) -> bool,
    missing: &str,
    invalid: &str,
) {
    if value.trim().is_empty() {
        errors.push(FieldError::new(field, missing));
    } else if !valid(value) {
        errors.push(FieldError::new(field, invalid));
    }
}

fn clean_optional(value: Option<&str>, clean: impl Fn(&str) -> String) -> Option<String> {
    value.map(clean).filter(|v| !v.is_empty())
}

/// Normalizes customer input before it is stored.
///
/// Trims the name and address fields, trims and lowercases the email, and
/// strips from the phone everything except digits, spaces and `+()-`.
/// Blank optionals become `None`; an address whose fields are all blank is
/// dropped.
#[must_use]
pub fn sanitize_customer(customer: &Customer) -> Customer {
    let address = customer.address.as_ref().and_then(|address| {
        let cleaned = Address {
            street: address.street.trim().to_string(),
            city: address.city.trim().to_string(),
            state: address.state.trim().to_string(),
            zip_code: address.zip_code.trim().to_string(),
            country: clean_optional(address.country.as_deref(), |c| c.trim().to_string()),
        };
        let blank = cleaned.street.is_empty()
            && cleaned.city.is_empty()
            && cleaned.state.is_empty()
            && cleaned.zip_code.is_empty()
            && cleaned.country.is_none();
        (!blank).then_some(cleaned)
    });

    Customer {
        name: customer.name.trim().to_string(),
        email: clean_optional(customer.email.as_deref(), |e| e.trim().to_lowercase()),
        phone: clean_optional(customer.phone.as_deref(), |p| {
            p.chars()
                .filter(|c| c.is_ascii_digit() || matches!(c, ' ' | '+' | '(' | ')' | '-'))
                .collect::<String>()
                .trim()
                .to_string()
        }),
        address,
    }
}

/// Builds a customer from form input; the address is kept only when any
/// address field is filled.
#[must_use]
pub fn form_data_to_customer(form: &CustomerFormData) -> Customer {
    let optional = |value: &str| (!value.is_empty()).then(|| value.to_string());

    Customer {
        name: form.name.clone(),
        email: optional(&form.email),
        phone: optional(&form.phone),
        address: has_address_data(form).then(|| Address {
            street: form.street.clone(),
            city: form.city.clone(),
            state: form.state.clone(),
            zip_code: form.zip_code.clone(),
            country: optional(&form.country),
        }),
    }
}

/// Flattens a customer back into form fields, blank where absent.
#[must_use]
pub fn customer_to_form_data(customer: &Customer) -> CustomerFormData {
    let address = customer.address.as_ref();
    CustomerFormData {
        name: customer.name.clone(),
        email: customer.email.clone().unwrap_or_default(),
        phone: customer.phone.clone().unwrap_or_default(),
        street: address.map(|a| a.street.clone()).unwrap_or_default(),
        city: address.map(|a| a.city.clone()).unwrap_or_default(),
        state: address.map(|a| a.state.clone()).unwrap_or_default(),
        zip_code: address.map(|a| a.zip_code.clone()).unwrap_or_default(),
        country: address
            .and_then(|a| a.country.clone())
            .unwrap_or_default(),
    }
}
