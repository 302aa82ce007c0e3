//! REGISTER Handler (§4.5).

use crate::call::LegHeaders;
use crate::headers;
use crate::location::LocationDirectory;
use crate::parser::ParsedMessage;

/// Handle a REGISTER request, updating the directory on a hit.
///
/// Authentication is not performed — the original server's digest-auth
/// fields exist but enforcement is out of scope here (`spec.md` §1
/// Non-goals).
pub fn handle_register(msg: &ParsedMessage, source_ip: &str, source_port: u16, directory: &LocationDirectory) -> String {
    let user_id = extract_user_id(&msg.from);
    let leg = LegHeaders {
        via: msg.via.clone(),
        from: msg.from.clone(),
        to: msg.to.clone(),
        cseq: msg.cseq.clone(),
    };

    let Some(user_id) = user_id else {
        return headers::response(404, "Not Found", &leg, msg.call_id_value(), &[], None);
    };

    if directory.find_by_user_id(&user_id).is_none() {
        return headers::response(404, "Not Found", &leg, msg.call_id_value(), &[], None);
    }

    directory.update_binding(&user_id, source_ip, source_port);

    let contact_value = msg.contact.strip_prefix("Contact:").unwrap_or(&msg.contact).trim();
    let contact_header = format!("Contact: {};expires=7200", contact_value);
    headers::response(200, "OK", &leg, msg.call_id_value(), &[contact_header], None)
}

/// Extract the user id between `sip:` and `@` in a From header line.
fn extract_user_id(from_line: &str) -> Option<String> {
    let after_scheme = from_line.split_once("sip:")?.1;
    let user_id = after_scheme.split('@').next()?;
    if user_id.is_empty() {
        None
    } else {
        Some(user_id.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;

    fn register(from_user: &str) -> String {
        format!(
            "REGISTER sip:192.168.32.131 SIP/2.0\r\n\
Via: SIP/2.0/UDP 10.0.0.5:5062;branch=z9hG4bKreg1\r\n\
From: <sip:{user}@192.168.32.131>;tag=reg\r\n\
To: <sip:{user}@192.168.32.131>\r\n\
Call-ID: reg-001@example.com\r\n\
CSeq: 1 REGISTER\r\n\
Contact: <sip:{user}@10.0.0.5:5062>\r\n\
Content-Length: 0\r\n\r\n",
            user = from_user
        )
    }

    #[test]
    fn registers_known_user_and_updates_directory() {
        let directory = LocationDirectory::seeded();
        let msg = parse(&register("1001")).unwrap();
        let response = handle_register(&msg, "10.0.0.5", 5062, &directory);

        assert!(response.starts_with("SIP/2.0 200 OK\r\n"));
        assert!(response.contains("Contact: <sip:1001@10.0.0.5:5062>;expires=7200"));
        assert!(response.ends_with("Content-Length: 0\r\n\r\n"));

        let entry = directory.find_by_user_id("1001").unwrap();
        assert_eq!(entry.ip, "10.0.0.5");
        assert_eq!(entry.port, 5062);
        assert!(entry.registered);
    }

    #[test]
    fn rejects_unknown_user() {
        let directory = LocationDirectory::seeded();
        let msg = parse(&register("9999")).unwrap();
        let response = handle_register(&msg, "10.0.0.5", 5062, &directory);

        assert!(response.starts_with("SIP/2.0 404 Not Found\r\n"));
        assert!(response.ends_with("Content-Length: 0\r\n\r\n"));
        assert!(directory.find_by_user_id("9999").is_none());
    }
}
