/// Builds the canonical wire name for a service method.
///
/// The canonical form is `"<service>::<method>"`.
pub fn procedure_name(service: &str, method: &str) -> String {
    format!("{service}::{method}")
}

/// Splits a canonical wire name into its service and method halves.
///
/// The name is split on the first `"::"`. When the separator is absent, the
/// whole string is the service and the method is empty.
pub fn split_procedure_name(name: &str) -> (&str, &str) {
    match name.split_once("::") {
        Some((service, method)) => (service, method),
        None => (name, ""),
    }
}

#[cfg(test)]
mod procedure_test {
    use crate::core::procedure::{
        procedure_name,
        split_procedure_name,
    };

    #[test]
    fn round_trips_canonical_names() {
        let name = procedure_name("KeyValue", "getValue");
        assert_eq!(name, "KeyValue::getValue");
        assert_eq!(split_procedure_name(&name), ("KeyValue", "getValue"));
    }

    #[test]
    fn splits_on_first_separator_only() {
        assert_eq!(split_procedure_name("Store::ns::get"), ("Store", "ns::get"));
    }

    #[test]
    fn treats_missing_separator_as_service() {
        assert_eq!(split_procedure_name("ping"), ("ping", ""));
        assert_eq!(split_procedure_name(""), ("", ""));
    }
}
