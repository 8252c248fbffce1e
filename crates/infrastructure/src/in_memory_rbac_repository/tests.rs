use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::Utc;
use warden_application::{AssignmentRepository, RoleRepository};
use warden_core::{AppError, Scope, ScopeId, UserId};
use warden_domain::{AssignmentKey, Permission, Role, RoleAssignment, RoleDefinitionInput, RoleId};

use super::InMemoryRbacRepository;

fn role(name: &str, is_system: bool, is_default: bool) -> Role {
    Role::new(RoleDefinitionInput {
        name: name.to_owned(),
        display_name: String::new(),
        description: None,
        permissions: vec![Permission::AgentsRead],
        level: 10,
        is_system,
        is_default,
    })
    .unwrap_or_else(|_| unreachable!())
}

fn user(value: &str) -> UserId {
    UserId::new(value).unwrap_or_else(|_| unreachable!())
}

fn scoped(value: &str) -> Scope {
    Scope::Scoped(ScopeId::new(value).unwrap_or_else(|_| unreachable!()))
}

fn assignment(user_id: &str, role_id: RoleId, scope: Scope) -> RoleAssignment {
    RoleAssignment::new(
        AssignmentKey {
            user_id: user(user_id),
            role_id,
            scope,
        },
        user("system"),
    )
}

#[tokio::test]
async fn insert_role_rejects_duplicate_name_and_second_default() {
    let repository = InMemoryRbacRepository::new();

    assert!(repository.insert_role(role("member", true, true)).await.is_ok());

    let duplicate = repository.insert_role(role("member", false, false)).await;
    assert!(matches!(duplicate, Err(AppError::Validation(_))));

    let second_default = repository.insert_role(role("guest", false, true)).await;
    assert!(matches!(second_default, Err(AppError::Conflict(_))));
    assert_eq!(repository.list_roles().await.unwrap_or_default().len(), 1);
}

#[tokio::test]
async fn find_roles_omits_unknown_ids() {
    let repository = InMemoryRbacRepository::new();
    let stored = repository
        .insert_role(role("viewer", true, false))
        .await
        .unwrap_or_else(|_| unreachable!());

    let found = repository
        .find_roles(&[stored.id(), RoleId::new()])
        .await
        .unwrap_or_default();

    assert_eq!(found, vec![stored]);
}

#[tokio::test]
async fn set_default_role_keeps_a_single_default() {
    let repository = InMemoryRbacRepository::new();
    let member = repository
        .insert_role(role("member", true, true))
        .await
        .unwrap_or_else(|_| unreachable!());
    let viewer = repository
        .insert_role(role("viewer", true, false))
        .await
        .unwrap_or_else(|_| unreachable!());

    let current = repository
        .set_default_role(Some(viewer.id()), Utc::now())
        .await
        .unwrap_or_default();
    assert_eq!(current.map(|role| role.id()), Some(viewer.id()));

    let defaults: Vec<RoleId> = repository
        .list_roles()
        .await
        .unwrap_or_default()
        .into_iter()
        .filter(Role::is_default)
        .map(|role| role.id())
        .collect();
    assert_eq!(defaults, vec![viewer.id()]);

    let missing = repository
        .set_default_role(Some(RoleId::new()), Utc::now())
        .await;
    assert!(matches!(missing, Err(AppError::NotFound(_))));
    assert_eq!(
        repository
            .find_default_role()
            .await
            .unwrap_or_default()
            .map(|role| role.id()),
        Some(viewer.id())
    );
    assert_ne!(member.id(), viewer.id());
}

#[tokio::test]
async fn update_role_permissions_replaces_set() {
    let repository = InMemoryRbacRepository::new();
    let stored = repository
        .insert_role(role("analyst", false, false))
        .await
        .unwrap_or_else(|_| unreachable!());

    let updated = repository
        .update_role_permissions(
            stored.id(),
            BTreeSet::from([Permission::DatasetsRead, Permission::AuditRead]),
            Utc::now(),
        )
        .await
        .unwrap_or_else(|_| unreachable!());

    assert!(!updated.grants(Permission::AgentsRead));
    assert_eq!(updated.permissions().len(), 2);
    assert_eq!(updated.created_at(), stored.created_at());
}

#[tokio::test]
async fn grant_is_idempotent_and_requires_existing_role() {
    let repository = InMemoryRbacRepository::new();
    let stored = repository
        .insert_role(role("viewer", true, false))
        .await
        .unwrap_or_else(|_| unreachable!());

    let first = repository
        .insert_assignment_if_absent(assignment("alice", stored.id(), scoped("o1")))
        .await
        .unwrap_or_else(|_| unreachable!());
    let second = repository
        .insert_assignment_if_absent(assignment("alice", stored.id(), scoped("o1")))
        .await
        .unwrap_or_else(|_| unreachable!());

    assert!(first.created);
    assert!(!second.created);
    assert_eq!(first.assignment, second.assignment);

    let missing_role = repository
        .insert_assignment_if_absent(assignment("alice", RoleId::new(), Scope::Global))
        .await;
    assert!(matches!(missing_role, Err(AppError::NotFound(_))));
}

#[tokio::test]
async fn delete_role_if_unassigned_guards_system_and_assigned_roles() {
    let repository = InMemoryRbacRepository::new();
    let system = repository
        .insert_role(role("owner", true, false))
        .await
        .unwrap_or_else(|_| unreachable!());
    let custom = repository
        .insert_role(role("contractor", false, false))
        .await
        .unwrap_or_else(|_| unreachable!());

    assert!(matches!(
        repository.delete_role_if_unassigned(system.id()).await,
        Err(AppError::Conflict(_))
    ));

    let grant = repository
        .insert_assignment_if_absent(assignment("bob", custom.id(), Scope::Global))
        .await;
    assert!(grant.is_ok());
    assert!(matches!(
        repository.delete_role_if_unassigned(custom.id()).await,
        Err(AppError::Conflict(_))
    ));

    let removed = repository
        .delete_assignment(&AssignmentKey {
            user_id: user("bob"),
            role_id: custom.id(),
            scope: Scope::Global,
        })
        .await;
    assert_eq!(removed.ok(), Some(true));
    assert!(repository.delete_role_if_unassigned(custom.id()).await.is_ok());
    assert!(
        repository
            .find_role(custom.id())
            .await
            .unwrap_or_default()
            .is_none()
    );
}

#[tokio::test]
async fn delete_assignments_in_scope_only_touches_that_scope() {
    let repository = InMemoryRbacRepository::new();
    let viewer = repository
        .insert_role(role("viewer", true, false))
        .await
        .unwrap_or_else(|_| unreachable!());

    for (user_id, scope) in [
        ("alice", scoped("o1")),
        ("alice", scoped("o2")),
        ("alice", Scope::Global),
        ("bob", scoped("o1")),
    ] {
        let result = repository
            .insert_assignment_if_absent(assignment(user_id, viewer.id(), scope))
            .await;
        assert!(result.is_ok());
    }

    let removed = repository
        .delete_assignments_in_scope(
            &user("alice"),
            &ScopeId::new("o1").unwrap_or_else(|_| unreachable!()),
        )
        .await
        .unwrap_or_default();

    assert_eq!(removed.len(), 1);
    assert_eq!(
        repository
            .list_assignments_for_user(&user("alice"))
            .await
            .unwrap_or_default()
            .len(),
        2
    );
    assert_eq!(
        repository
            .list_assignments_for_role(viewer.id())
            .await
            .unwrap_or_default()
            .len(),
        3
    );
}

#[tokio::test]
async fn concurrent_grants_of_same_key_create_one_row() {
    let repository = Arc::new(InMemoryRbacRepository::new());
    let viewer = repository
        .insert_role(role("viewer", true, false))
        .await
        .unwrap_or_else(|_| unreachable!());

    let mut handles = Vec::new();
    for _ in 0..8 {
        let repository = Arc::clone(&repository);
        let role_id = viewer.id();
        handles.push(tokio::spawn(async move {
            repository
                .insert_assignment_if_absent(assignment("carol", role_id, scoped("o1")))
                .await
                .map(|outcome| outcome.created)
                .unwrap_or(false)
        }));
    }

    let mut created = 0;
    for handle in handles {
        if handle.await.unwrap_or(false) {
            created += 1;
        }
    }

    assert_eq!(created, 1);
    assert_eq!(
        repository
            .list_assignments_for_user(&user("carol"))
            .await
            .unwrap_or_default()
            .len(),
        1
    );
}
