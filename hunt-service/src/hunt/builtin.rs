// Built-in Hunts
// The fixed hunt catalog and the command plugins it relies on

use crate::hunt::models::{HuntDefinition, ParameterSpec, ParameterType, StepDefinition};
use crate::plugins::CommandSpec;

/// Command plugins registered by default
pub fn default_command_specs() -> Vec<CommandSpec> {
    vec![
        CommandSpec::new("dns_lookup", "dig", ["+short", "A", "{domain}"])
            .description("Resolve A records with dig"),
        CommandSpec::new("mx_lookup", "dig", ["+short", "MX", "{domain}"])
            .description("Resolve MX records with dig"),
        CommandSpec::new("txt_lookup", "dig", ["+short", "TXT", "{domain}"])
            .description("Resolve TXT records (SPF, DMARC, verification tokens)"),
        CommandSpec::new("reverse_dns", "dig", ["+short", "-x", "{address}"])
            .description("Reverse-resolve an IP address"),
        CommandSpec::new("whois_lookup", "whois", ["{domain}"])
            .description("WHOIS registration record"),
        CommandSpec::new("http_headers", "curl", ["-sSI", "--max-time", "20", "https://{domain}"])
            .description("Fetch HTTP response headers"),
        CommandSpec::new(
            "github_profile",
            "curl",
            ["-s", "-o", "/dev/null", "-w", "%{{http_code}}", "https://github.com/{username}"],
        )
        .description("Probe for a GitHub profile (prints the HTTP status)"),
        CommandSpec::new(
            "gitlab_profile",
            "curl",
            ["-s", "-o", "/dev/null", "-w", "%{{http_code}}", "https://gitlab.com/{username}"],
        )
        .description("Probe for a GitLab profile (prints the HTTP status)"),
    ]
}

/// Hunts shipped with the engine
pub fn builtin_hunts() -> Vec<HuntDefinition> {
    vec![domain_recon(), email_investigation(), username_sweep()]
}

fn domain_recon() -> HuntDefinition {
    HuntDefinition::new("domain_recon", "Domain Reconnaissance")
        .description("Resolve a domain, pull its registration record and fingerprint its web front")
        .category("infrastructure")
        .parameter(ParameterSpec::required(
            "domain",
            ParameterType::String,
            "Domain to investigate",
        ))
        .step(
            StepDefinition::new("dns", "dns_lookup")
                .display_name("DNS A records")
                .map("domain", "initial.domain"),
        )
        .step(
            StepDefinition::new("whois", "whois_lookup")
                .display_name("WHOIS record")
                .map("domain", "initial.domain")
                .timeout(60),
        )
        .step(
            StepDefinition::new("mx", "mx_lookup")
                .display_name("Mail exchangers")
                .map("domain", "initial.domain")
                .optional(),
        )
        .step(
            StepDefinition::new("headers", "http_headers")
                .display_name("HTTP headers")
                .map("domain", "initial.domain")
                .timeout(30)
                .optional(),
        )
        .step(
            StepDefinition::new("reverse", "reverse_dns")
                .display_name("Reverse DNS of first address")
                .description("PTR lookup of the first A record")
                .map("address", "dns.results[0].data.line")
                .depends_on(["dns"])
                .optional(),
        )
        .step(
            StepDefinition::new("summary", "echo")
                .display_name("Summary")
                .map("domain", "initial.domain")
                .map("addresses", "dns.results")
                .map("registration", "whois.results")
                .depends_on(["dns", "whois"]),
        )
}

fn email_investigation() -> HuntDefinition {
    HuntDefinition::new("email_investigation", "Email Domain Investigation")
        .description("Map the mail infrastructure and sender policy of an email domain")
        .category("email")
        .parameter(ParameterSpec::required(
            "domain",
            ParameterType::String,
            "Domain part of the email address",
        ))
        .parameter(ParameterSpec::optional(
            "email",
            ParameterType::String,
            "Full address, kept for the case record",
        ))
        .step(
            StepDefinition::new("mx", "mx_lookup")
                .display_name("Mail exchangers")
                .map("domain", "initial.domain"),
        )
        .step(
            StepDefinition::new("spf", "txt_lookup")
                .display_name("TXT / SPF records")
                .map("domain", "initial.domain"),
        )
        .step(
            StepDefinition::new("whois", "whois_lookup")
                .display_name("WHOIS record")
                .map("domain", "initial.domain")
                .timeout(60)
                .optional(),
        )
        .step(
            StepDefinition::new("headers", "http_headers")
                .display_name("Web presence")
                .map("domain", "initial.domain")
                .timeout(30)
                .optional(),
        )
}

fn username_sweep() -> HuntDefinition {
    HuntDefinition::new("username_sweep", "Username Sweep")
        .description("Check code-hosting platforms for a username")
        .category("identity")
        .parameter(ParameterSpec::required(
            "username",
            ParameterType::String,
            "Handle to look for",
        ))
        .step(
            StepDefinition::new("github", "github_profile")
                .display_name("GitHub")
                .map("username", "initial.username")
                .timeout(30)
                .optional(),
        )
        .step(
            StepDefinition::new("gitlab", "gitlab_profile")
                .display_name("GitLab")
                .map("username", "initial.username")
                .timeout(30)
                .optional(),
        )
        .step(
            StepDefinition::new("summary", "echo")
                .display_name("Summary")
                .map("username", "initial.username")
                .map("github", "github")
                .map("gitlab", "gitlab")
                .depends_on(["github", "gitlab"]),
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hunt::validation::validate_definition;
    use std::collections::HashSet;

    #[test]
    fn test_builtin_hunts_are_valid() {
        for hunt in builtin_hunts() {
            validate_definition(&hunt)
                .unwrap_or_else(|e| panic!("{} is invalid: {}", hunt.name, e));
        }
    }

    #[test]
    fn test_builtin_hunts_only_use_known_plugins() {
        let mut known: HashSet<String> = default_command_specs().into_iter().map(|s| s.name).collect();
        known.insert("echo".to_string());

        for hunt in builtin_hunts() {
            for step in &hunt.steps {
                assert!(
                    known.contains(&step.plugin_name),
                    "{}: step '{}' uses unknown plugin '{}'",
                    hunt.name,
                    step.step_id,
                    step.plugin_name
                );
            }
        }
    }
}
