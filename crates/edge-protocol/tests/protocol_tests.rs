//! Protocol layer tests: claim decoding, admin/expiry predicates, decisions, errors.

#[cfg(test)]
mod tests {
    use base64::Engine;
    use edge_protocol::*;
    use serde_json::{Value, json};

    /// Build a structurally valid, unsigned token around `payload`.
    fn token(payload: &Value) -> String {
        let engine = base64::engine::general_purpose::URL_SAFE_NO_PAD;
        let header = engine.encode(r#"{"alg":"HS256","typ":"JWT"}"#);
        let body = engine.encode(payload.to_string());
        format!("{header}.{body}.test-signature")
    }

    fn payload(role: &str, is_super_admin: bool) -> Value {
        json!({
            "sub": "test-user-123",
            "email": "test@example.com",
            "aud": "authenticated",
            "exp": chrono::Utc::now().timestamp() + 3600,
            "iat": chrono::Utc::now().timestamp(),
            "iss": "https://test.supabase.co/auth/v1",
            "user_metadata": { "role": role, "is_super_admin": is_super_admin },
            "app_metadata": {}
        })
    }

    // ─────────────────────────────────────────────────────────────────────
    // Decoding
    // ─────────────────────────────────────────────────────────────────────

    #[test]
    fn decodes_well_formed_token() {
        let claims = decode_unverified(&token(&payload("member", false))).unwrap();
        assert_eq!(claims.subject(), Some("test-user-123"));
        assert_eq!(claims.email(), Some("test@example.com"));
        assert_eq!(claims.issuer.as_deref(), Some("https://test.supabase.co/auth/v1"));
        assert!(!claims.is_expired());
    }

    #[test]
    fn wrong_segment_count_is_malformed() {
        for t in ["", "a", "a.b", "a.b.c.d", "a..c", ".b.c"] {
            assert_eq!(decode_unverified(t), Err(EdgeError::MalformedToken), "token {t:?}");
        }
    }

    #[test]
    fn invalid_base64_payload_is_malformed() {
        assert_eq!(decode_unverified("header.!!!not-base64!!!.sig"), Err(EdgeError::MalformedToken));
    }

    #[test]
    fn non_json_payload_is_malformed() {
        let body = base64::engine::general_purpose::URL_SAFE_NO_PAD.encode("not json");
        assert_eq!(decode_unverified(&format!("h.{body}.s")), Err(EdgeError::MalformedToken));
    }

    #[test]
    fn json_array_payload_is_malformed() {
        let body = base64::engine::general_purpose::URL_SAFE_NO_PAD.encode("[1,2,3]");
        assert_eq!(decode_unverified(&format!("h.{body}.s")), Err(EdgeError::MalformedToken));
    }

    // ─────────────────────────────────────────────────────────────────────
    // Expiry
    // ─────────────────────────────────────────────────────────────────────

    #[test]
    fn missing_expiry_is_expired() {
        let claims = decode_unverified(&token(&json!({"sub": "u1"}))).unwrap();
        assert!(claims.is_expired());
    }

    #[test]
    fn past_expiry_is_expired() {
        let exp = chrono::Utc::now().timestamp() - 3600;
        let claims = decode_unverified(&token(&json!({"sub": "u1", "exp": exp}))).unwrap();
        assert!(claims.is_expired());
        assert!(!claims.is_expired_at(exp - 1));
    }

    // ─────────────────────────────────────────────────────────────────────
    // Admin predicate
    // ─────────────────────────────────────────────────────────────────────

    fn admin(p: Value) -> bool {
        decode_unverified(&token(&p)).unwrap().has_admin_claim()
    }

    #[test]
    fn member_is_not_admin() {
        assert!(!admin(payload("member", false)));
    }

    #[test]
    fn user_metadata_admin_or_owner() {
        assert!(admin(payload("admin", false)));
        assert!(admin(payload("owner", false)));
    }

    #[test]
    fn user_metadata_super_admin() {
        assert!(admin(payload("member", true)));
    }

    #[test]
    fn app_metadata_admin_role() {
        assert!(admin(json!({"sub": "u", "app_metadata": {"role": "admin"}})));
        assert!(admin(json!({"sub": "u", "app_metadata": {"role": "owner"}})));
    }

    #[test]
    fn app_metadata_super_admin() {
        assert!(admin(json!({"sub": "u", "app_metadata": {"is_super_admin": true}})));
    }

    #[test]
    fn no_metadata_is_not_admin() {
        assert!(!admin(json!({"sub": "u"})));
        assert!(!admin(json!({"sub": "u", "role": "authenticated"})));
    }

    #[test]
    fn app_metadata_wins_role_projection() {
        let claims = decode_unverified(&token(&json!({
            "sub": "u",
            "user_metadata": {"role": "admin", "is_super_admin": true},
            "app_metadata": {"role": "member", "is_super_admin": false, "organization_id": "org-123"}
        })))
        .unwrap();
        assert_eq!(claims.role(), Some("member"));
        assert_eq!(claims.user_role(), Some(UserRole::Member));
        assert!(!claims.is_super_admin());
        assert_eq!(claims.organization_id(), Some("org-123"));
    }

    #[test]
    fn user_metadata_used_when_app_metadata_silent() {
        let claims = decode_unverified(&token(&payload("owner", true))).unwrap();
        assert_eq!(claims.role(), Some("owner"));
        assert!(claims.is_super_admin());
    }

    // ─────────────────────────────────────────────────────────────────────
    // Decisions & errors
    // ─────────────────────────────────────────────────────────────────────

    #[test]
    fn error_status_mapping() {
        assert_eq!(EdgeError::invalid_token_format().status(), 401);
        assert_eq!(EdgeError::authentication_required().status(), 401);
        assert_eq!(EdgeError::admin_required().status(), 403);
        assert_eq!(EdgeError::NotFound.status(), 404);
    }

    #[test]
    fn error_body_wire_format() {
        let body = serde_json::to_string(&EdgeError::invalid_token_format().body()).unwrap();
        assert_eq!(body, r#"{"error":"Invalid token format"}"#);
    }

    #[test]
    fn error_to_decision() {
        assert_eq!(
            EdgeError::NotFound.to_decision(),
            AdmissionDecision::deny(404, "not found"),
        );
    }

    #[test]
    fn redirect_constructors() {
        let d = AdmissionDecision::redirect_permanent("https://example.com/");
        assert_eq!(d, AdmissionDecision::RedirectTo { location: "https://example.com/".into(), status: 301 });
        assert!(d.is_redirect());
        assert_eq!(AdmissionDecision::redirect_temporary("/x").location(), Some("/x"));
    }

    #[test]
    fn request_context_normalizes_path() {
        let ctx = RequestContext::new("example.com", "", Some(""));
        assert_eq!(ctx.path, "/");
        assert!(ctx.query.is_none());

        let ctx = RequestContext::new("example.com", "docs", Some("a=1"));
        assert_eq!(ctx.path_and_query(), "/docs?a=1");
    }

    #[test]
    fn config_primary_domain_is_lowercased() {
        let config = EdgeConfig::default().with_primary_domain("Example.COM");
        assert_eq!(config.primary_domain.as_deref(), Some("example.com"));
        assert!(EdgeConfig::default().with_primary_domain("").primary_domain.is_none());
    }
}
