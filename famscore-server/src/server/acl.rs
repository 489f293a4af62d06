use super::{AppError, auth::AuthCtx};
use axum::response::Response;
use axum::{
    extract::OriginalUri,
    http::{Method, Request},
    middleware::Next,
};
use famscore_shared::domain::MemberRole;
use percent_encoding::percent_decode_str;

use crate::engine::Actor;

/// Route-level access rules for the family-scoped API. Denies any
/// family scope other than the actor's own, then applies the role
/// matrix. Handlers and the engine still re-check per-row ownership
/// and the self-authoring rules.
pub async fn enforce_acl(
    req: Request<axum::body::Body>,
    next: Next,
) -> Result<Response, AppError> {
    let path = req
        .extensions()
        .get::<OriginalUri>()
        .map(|orig| orig.0.path().to_string())
        .unwrap_or_else(|| req.uri().path().to_string());
    let method = req.method().clone();
    let Some(auth) = req.extensions().get::<AuthCtx>() else {
        return Err(AppError::unauthorized());
    };
    let actor = &auth.actor;

    let segs = segmented(&path);
    let Some(rest) = family_rest(&segs, actor) else {
        tracing::warn!(
            path = %path,
            member_id = %actor.member_id,
            "ACL: path outside the actor's family scope"
        );
        return Err(AppError::forbidden());
    };

    if let Err(err) = allow(&method, rest, actor) {
        tracing::warn!(
            method = %method,
            path = %path,
            member_id = %actor.member_id,
            role = %actor.role,
            "ACL: no rule matched; denying"
        );
        return Err(err);
    }

    Ok(next.run(req).await)
}

/// Strips `api/v1/families/{id}` and verifies the id is the actor's
/// own family. Returns the remaining segments.
fn family_rest<'a>(segs: &'a [&'a str], actor: &Actor) -> Option<&'a [&'a str]> {
    match segs {
        ["api", "v1", "families", family, rest @ ..] if decode(family) == actor.family_id => {
            Some(rest)
        }
        _ => None,
    }
}

fn allow(method: &Method, rest: &[&str], actor: &Actor) -> Result<(), AppError> {
    let admin = || {
        if actor.role == MemberRole::Admin {
            Ok(())
        } else {
            Err(AppError::forbidden())
        }
    };
    match rest {
        // Reads are open to every family member.
        [] if *method == Method::GET => Ok(()),
        ["members"] if *method == Method::GET => Ok(()),
        ["members", _] if *method == Method::GET => Ok(()),
        ["members", _, "scores"] if *method == Method::GET => Ok(()),
        ["members", _, "streak"] if *method == Method::GET => Ok(()),
        ["leaderboard"] if *method == Method::GET => Ok(()),
        ["scores", "recent"] if *method == Method::GET => Ok(()),
        ["today"] if *method == Method::GET => Ok(()),
        ["tasks"] if *method == Method::GET => Ok(()),
        ["sport-activities"] if *method == Method::GET => Ok(()),
        ["school-tasks"] if *method == Method::GET => Ok(()),

        // Admin-gated management surface.
        ["settings"] if *method == Method::PUT => admin(),
        ["members"] if *method == Method::POST => admin(),
        ["members", _] if *method == Method::PUT => admin(),
        ["members", _, "adjustments"] if *method == Method::POST => admin(),
        ["tasks"] if *method == Method::POST => admin(),
        ["tasks", _] if *method == Method::PUT || *method == Method::DELETE => admin(),
        ["sport-activities", _] if *method == Method::PUT || *method == Method::DELETE => admin(),
        ["school-tasks", _] if *method == Method::PUT || *method == Method::DELETE => admin(),

        // Lifecycle transitions any member may trigger; the engine
        // validates state, family ownership and the reset flag.
        ["tasks", _, "take"] if *method == Method::POST => Ok(()),
        ["tasks", _, "release"] if *method == Method::POST => Ok(()),
        ["tasks", _, "complete"] if *method == Method::POST => Ok(()),
        ["sport-activities", _, "complete"] if *method == Method::POST => Ok(()),
        ["school-tasks", _, "complete"] if *method == Method::POST => Ok(()),
        ["scores", _, "reset"] if *method == Method::POST => Ok(()),

        // Self-authoring creates; the engine enforces who may author what.
        ["sport-activities"] if *method == Method::POST => Ok(()),
        ["school-tasks"] if *method == Method::POST => Ok(()),

        _ => Err(AppError::forbidden()),
    }
}

fn segmented(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

fn decode(seg: &str) -> String {
    percent_decode_str(seg).decode_utf8_lossy().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn actor(role: MemberRole) -> Actor {
        Actor {
            member_id: "m1".into(),
            family_id: "fam1".into(),
            role,
        }
    }

    fn check(method: Method, path: &str, role: MemberRole) -> bool {
        let a = actor(role);
        let segs = segmented(path);
        match family_rest(&segs, &a) {
            Some(rest) => allow(&method, rest, &a).is_ok(),
            None => false,
        }
    }

    #[test]
    fn foreign_family_scope_is_denied() {
        assert!(!check(
            Method::GET,
            "/api/v1/families/other/tasks",
            MemberRole::Admin
        ));
        assert!(check(
            Method::GET,
            "/api/v1/families/fam1/tasks",
            MemberRole::Regular
        ));
    }

    #[test]
    fn admin_routes_reject_regular_members() {
        for (method, path) in [
            (Method::POST, "/api/v1/families/fam1/tasks"),
            (Method::PUT, "/api/v1/families/fam1/tasks/t1"),
            (Method::DELETE, "/api/v1/families/fam1/tasks/t1"),
            (Method::PUT, "/api/v1/families/fam1/settings"),
            (Method::POST, "/api/v1/families/fam1/members"),
            (Method::POST, "/api/v1/families/fam1/members/m2/adjustments"),
        ] {
            assert!(!check(method.clone(), path, MemberRole::Regular), "{path}");
            assert!(check(method, path, MemberRole::Admin), "{path}");
        }
    }

    #[test]
    fn lifecycle_transitions_are_open_to_members() {
        for path in [
            "/api/v1/families/fam1/tasks/t1/take",
            "/api/v1/families/fam1/tasks/t1/release",
            "/api/v1/families/fam1/tasks/t1/complete",
            "/api/v1/families/fam1/sport-activities/a1/complete",
            "/api/v1/families/fam1/school-tasks/s1/complete",
            "/api/v1/families/fam1/scores/e1/reset",
            "/api/v1/families/fam1/sport-activities",
            "/api/v1/families/fam1/school-tasks",
        ] {
            assert!(check(Method::POST, path, MemberRole::Regular), "{path}");
        }
    }

    #[test]
    fn encoded_family_segment_is_decoded() {
        let a = Actor {
            member_id: "m1".into(),
            family_id: "fam one".into(),
            role: MemberRole::Regular,
        };
        let segs = segmented("/api/v1/families/fam%20one/today");
        assert!(family_rest(&segs, &a).is_some());
    }
}
