//! Response generation command.

use idp_saml::{AssertedAttribute, Principal, SamlResponse};
use tracing::debug;

use crate::cli::ResponseArgs;
use crate::commands::local_registry;
use crate::CliConfig;

/// Runs `idp response`.
pub fn run_response(args: ResponseArgs, config: &CliConfig) -> crate::CliResult<()> {
    let registry = local_registry(config)?;
    let sp = registry.require(&args.sp)?;

    let mut signing = config.signing()?;
    if let Some(algorithm) = args.algorithm {
        signing = signing.with_algorithm(algorithm);
    }

    let mut builder = sp
        .response_context()
        .issuer_uri(&config.idp.issuer_uri)
        .expiry(config.idp.assertion_expiry());
    if let Some(acs_url) = &args.acs_url {
        builder = builder.saml_acs_url(acs_url);
    }
    if let Some(request_id) = &args.request_id {
        builder = builder.saml_request_id(request_id);
    }
    let context = builder.build()?;

    let principal = principal(&args.name_id, args.name_id_format.as_deref(), &args.attributes)?;
    debug!(sp = %sp.identifier(), attributes = principal.attributes.len(), "building response");

    let response = SamlResponse::new(context, principal, signing)
        .with_signing_policy(sp.signing_policy());
    if args.xml {
        println!("{}", response.render()?);
    } else {
        println!("{}", response.encoded()?);
    }
    Ok(())
}

/// Builds the principal, grouping repeated attribute names into one
/// multi-valued attribute in first-seen order.
fn principal(
    name_id: &str,
    name_id_format: Option<&str>,
    attributes: &[String],
) -> crate::CliResult<Principal> {
    let mut grouped: Vec<(String, Vec<String>)> = Vec::new();
    for pair in attributes {
        let (name, value) = pair.split_once('=').ok_or_else(|| {
            crate::CliError::InvalidArgument(format!("attribute must be NAME=VALUE: {pair}"))
        })?;
        if name.is_empty() {
            return Err(crate::CliError::InvalidArgument(format!(
                "attribute name is empty: {pair}"
            )));
        }
        match grouped.iter_mut().find(|(n, _)| n == name) {
            Some((_, values)) => values.push(value.to_string()),
            None => grouped.push((name.to_string(), vec![value.to_string()])),
        }
    }

    let mut principal = Principal::new(name_id);
    if let Some(format) = name_id_format {
        principal = principal.with_name_id_format(format);
    }
    for (name, values) in grouped {
        principal = principal.with_attribute(AssertedAttribute::multi(name, values));
    }
    Ok(principal)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_names_become_one_attribute() {
        let attributes = [
            "groups=staff".to_string(),
            "email=foo@example.com".to_string(),
            "groups=admins".to_string(),
        ];
        let principal = principal("foo@example.com", None, &attributes).unwrap();
        let mapping = principal.to_mapping();
        assert_eq!(mapping.len(), 2);
        assert_eq!(mapping[0].0, "groups");
        assert_eq!(mapping[0].1, ["staff", "admins"]);
        assert_eq!(mapping[1].1, ["foo@example.com"]);
    }

    #[test]
    fn values_may_contain_equals() {
        let principal = principal("foo", None, &["token=a=b".to_string()]).unwrap();
        assert_eq!(principal.to_mapping()[0].1, ["a=b"]);
    }

    #[test]
    fn malformed_attribute_is_rejected() {
        assert!(matches!(
            principal("foo", None, &["novalue".to_string()]),
            Err(crate::CliError::InvalidArgument(_))
        ));
        assert!(matches!(
            principal("foo", None, &["=x".to_string()]),
            Err(crate::CliError::InvalidArgument(_))
        ));
    }

    #[test]
    fn name_id_format_is_applied() {
        let format = "urn:oasis:names:tc:SAML:2.0:nameid-format:persistent";
        let principal = principal("foo", Some(format), &[]).unwrap();
        assert_eq!(principal.name_id_format, format);
    }
}
