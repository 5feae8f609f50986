//! Proposal submission, the supervisor request lifecycle and capacity checked
//! supervisor assignment.
//!
//! Requests move `Pending -> Accepted | Rejected` exactly once. Accepting a request
//! does not link the student and teacher; only [`assign_supervisor`] does that, and
//! only for approved projects whose teacher still has capacity.

use uuid::Uuid;

use crate::data::notification::{NotificationType, Priority};
use crate::data::project::db::{problem as project_problem, FeedbackData, ProposalData};
use crate::data::project::{Feedback, Project, ProjectStatus};
use crate::data::request::{
    problem as request_problem, validate_message, RequestStatus, SupervisorRequest,
};
use crate::data::user::User;
use crate::data::{Assignment, Store, StoreError};
use crate::mail::{template, Mailer};
use crate::notify::notify_user;
use crate::resp::problem::Problem;
use crate::role::Role;

pub mod problem {
    use crate::resp::problem::Problem;
    use rocket::http::Status;

    #[inline]
    pub fn missing_ids() -> Problem {
        Problem::new(
            Status::BadRequest,
            "Both studentId and supervisorId are required to assign a supervisor.",
        )
    }

    #[inline]
    pub fn no_project() -> Problem {
        Problem::new(
            Status::NotFound,
            "No project found for the given studentId.",
        )
    }

    #[inline]
    pub fn already_assigned() -> Problem {
        Problem::new(
            Status::BadRequest,
            "Supervisor has already been assigned to this student.",
        )
    }

    #[inline]
    pub fn not_approved() -> Problem {
        Problem::new(
            Status::BadRequest,
            "Cannot assign supervisor to a project that is not approved.",
        )
    }

    #[inline]
    pub fn student_not_found() -> Problem {
        Problem::new(Status::NotFound, "Student not found.")
    }

    #[inline]
    pub fn invalid_supervisor() -> Problem {
        Problem::new(Status::NotFound, "Invalid supervisor selected.")
    }

    #[inline]
    pub fn capacity_reached() -> Problem {
        Problem::new(
            Status::BadRequest,
            "Supervisor has reached maximum student capacity.",
        )
    }
}

/// Creates a pending proposal for `student`.
///
/// A student holds one active project; a rejected one is replaced.
pub async fn submit_proposal(
    store: &dyn Store,
    student: &User,
    data: ProposalData,
) -> Result<Project, Problem> {
    let (title, description) = data.validate()?;

    if let Some(existing) = store.latest_project_for(student.id).await? {
        if existing.status != ProjectStatus::Rejected {
            return Err(project_problem::already_submitted());
        }
        tracing::info!(
            "Replacing rejected project {} of student {}",
            existing.id,
            student.id
        );
        store.delete_project(existing.id).await?;
    }

    let project = Project::new(student.id, title, description);
    store.insert_project(&project).await?;
    store.set_user_project(student.id, Some(project.id)).await?;

    Ok(project)
}

async fn find_teacher(store: &dyn Store, id: Uuid) -> Result<User, Problem> {
    match store.get_user(id).await? {
        Some(user) if user.role == Role::Teacher => Ok(user),
        _ => Err(problem::invalid_supervisor()),
    }
}

/// Files a pending request from `student` to the teacher `teacher_id`.
pub async fn request_supervisor(
    store: &dyn Store,
    student: &User,
    teacher_id: Option<Uuid>,
    message: &str,
) -> Result<SupervisorRequest, Problem> {
    if student.supervisor.is_some() {
        return Err(request_problem::already_supervised());
    }
    let message = validate_message(message)?;

    let teacher = match teacher_id {
        Some(id) => find_teacher(store, id).await?,
        None => return Err(problem::invalid_supervisor()),
    };
    if !teacher.has_capacity() {
        return Err(problem::capacity_reached());
    }

    let request = SupervisorRequest::new(student.id, teacher.id, message);
    match store.insert_request(&request).await {
        Ok(()) => {}
        Err(StoreError::Duplicate(_)) => return Err(request_problem::duplicate_pending()),
        Err(e) => return Err(e.into()),
    }
    tracing::info!(
        "Student {} requested supervision from {}",
        student.id,
        teacher.id
    );

    notify_user(
        store,
        teacher.id,
        format!("{} has requested you to be their supervisor.", student.name),
        NotificationType::Request,
        Priority::Medium,
        Some("/teacher/requests"),
    )
    .await;

    Ok(request)
}

async fn transition(
    store: &dyn Store,
    teacher: &User,
    request_id: Uuid,
    status: RequestStatus,
) -> Result<SupervisorRequest, Problem> {
    if let Some(request) = store
        .transition_request(request_id, teacher.id, status)
        .await?
    {
        return Ok(request);
    }

    match store.get_request(request_id).await? {
        Some(request) if request.supervisor == teacher.id => {
            Err(request_problem::already_processed())
        }
        _ => Err(request_problem::not_found()),
    }
}

async fn announce_decision(
    store: &dyn Store,
    mailer: &dyn Mailer,
    teacher: &User,
    request: &SupervisorRequest,
) {
    let accepted = request.status == RequestStatus::Accepted;
    let (verb, kind) = if accepted {
        ("accepted", NotificationType::Approval)
    } else {
        ("rejected", NotificationType::Rejection)
    };

    notify_user(
        store,
        request.student,
        format!("Your request has been {} by {}.", verb, teacher.name),
        kind,
        Priority::High,
        Some("/student/status"),
    )
    .await;

    let student = match store.get_user(request.student).await {
        Ok(Some(it)) => it,
        Ok(None) => {
            tracing::warn!("Student {} of request {} is gone", request.student, request.id);
            return;
        }
        Err(e) => {
            tracing::warn!("Unable to load student {}: {}", request.student, e);
            return;
        }
    };

    let mail = if accepted {
        template::request_accepted(&student.email, &teacher.name)
    } else {
        template::request_rejected(&student.email, &teacher.name)
    };
    if let Err(e) = mailer.send(mail).await {
        tracing::warn!("Unable to mail decision on request {}: {}", request.id, e);
    }
}

/// Accepts a pending request addressed to `teacher`.
pub async fn accept_request(
    store: &dyn Store,
    mailer: &dyn Mailer,
    teacher: &User,
    request_id: Uuid,
) -> Result<SupervisorRequest, Problem> {
    let request = transition(store, teacher, request_id, RequestStatus::Accepted).await?;
    tracing::info!("Teacher {} accepted request {}", teacher.id, request.id);
    announce_decision(store, mailer, teacher, &request).await;
    Ok(request)
}

/// Rejects a pending request addressed to `teacher`.
pub async fn reject_request(
    store: &dyn Store,
    mailer: &dyn Mailer,
    teacher: &User,
    request_id: Uuid,
) -> Result<SupervisorRequest, Problem> {
    let request = transition(store, teacher, request_id, RequestStatus::Rejected).await?;
    tracing::info!("Teacher {} rejected request {}", teacher.id, request.id);
    announce_decision(store, mailer, teacher, &request).await;
    Ok(request)
}

/// Student and supervisor after a successful assignment.
#[derive(Debug, Clone)]
pub struct AssignedPair {
    pub student: User,
    pub supervisor: User,
}

/// Directly links a student with an approved project to a teacher with spare capacity.
pub async fn assign_supervisor(
    store: &dyn Store,
    student_id: Option<Uuid>,
    supervisor_id: Option<Uuid>,
) -> Result<AssignedPair, Problem> {
    let (student_id, supervisor_id) = match (student_id, supervisor_id) {
        (Some(student), Some(supervisor)) => (student, supervisor),
        _ => return Err(problem::missing_ids()),
    };

    let project = store
        .latest_project_for(student_id)
        .await?
        .ok_or_else(problem::no_project)?;
    check_assignable(&project)?;

    match store.get_user(student_id).await? {
        Some(user) if user.role == Role::Student => {}
        _ => return Err(problem::student_not_found()),
    }
    let teacher = find_teacher(store, supervisor_id).await?;
    if !teacher.has_capacity() {
        return Err(problem::capacity_reached());
    }

    let (student, supervisor) = match store
        .assign_supervisor(student_id, supervisor_id, project.id)
        .await?
    {
        Assignment::Assigned {
            student,
            supervisor,
            ..
        } => (student, supervisor),
        Assignment::CapacityReached => return Err(problem::capacity_reached()),
        Assignment::NotFound => return Err(problem::student_not_found()),
        Assignment::ProjectUnavailable => {
            // The project changed after it was checked above.
            let current = store
                .get_project(project.id)
                .await?
                .ok_or_else(problem::no_project)?;
            check_assignable(&current)?;
            return Err(problem::already_assigned());
        }
    };
    tracing::info!(
        "Assigned supervisor {} to student {} (project {})",
        supervisor.id,
        student.id,
        project.id
    );

    notify_user(
        store,
        student.id,
        format!(
            "{} has been assigned as supervisor for your project.",
            supervisor.name
        ),
        NotificationType::Approval,
        Priority::High,
        Some("/student/status"),
    )
    .await;
    notify_user(
        store,
        supervisor.id,
        format!(
            "The student {} has been assigned to you for FYP supervision.",
            student.name
        ),
        NotificationType::Comment,
        Priority::High,
        Some("/teacher/status"),
    )
    .await;

    Ok(AssignedPair {
        student,
        supervisor,
    })
}

fn check_assignable(project: &Project) -> Result<(), Problem> {
    if project.supervisor.is_some() {
        return Err(problem::already_assigned());
    }
    if project.status != ProjectStatus::Approved {
        return Err(problem::not_approved());
    }
    Ok(())
}

async fn supervised_project(
    store: &dyn Store,
    teacher: &User,
    project_id: Uuid,
    action: &str,
) -> Result<Project, Problem> {
    let project = store
        .get_project(project_id)
        .await?
        .ok_or_else(|| project_problem::not_found(project_id))?;
    if project.supervisor != Some(teacher.id) {
        return Err(project_problem::not_supervised(action));
    }
    Ok(project)
}

/// Marks a project supervised by `teacher` as completed.
pub async fn mark_completed(
    store: &dyn Store,
    teacher: &User,
    project_id: Uuid,
) -> Result<Project, Problem> {
    let project = supervised_project(store, teacher, project_id, "complete").await?;
    let updated = store
        .set_project_status(project.id, ProjectStatus::Completed)
        .await?
        .ok_or_else(|| project_problem::not_found(project_id))?;

    notify_user(
        store,
        project.student,
        format!(
            "Your project \"{}\" has been marked as completed by {}.",
            project.title, teacher.name
        ),
        NotificationType::Comment,
        Priority::Low,
        Some("/student/status"),
    )
    .await;

    Ok(updated)
}

/// Adds feedback from `teacher` to a project they supervise.
pub async fn add_feedback(
    store: &dyn Store,
    teacher: &User,
    project_id: Uuid,
    data: FeedbackData,
) -> Result<(Project, Feedback), Problem> {
    let project = supervised_project(store, teacher, project_id, "add feedback to").await?;
    let feedback = data.into_feedback(teacher.id)?;

    let updated = store
        .push_project_feedback(project.id, &feedback)
        .await?
        .ok_or_else(|| project_problem::not_found(project_id))?;

    notify_user(
        store,
        project.student,
        format!(
            "Your project \"{}\" has received new feedback from {}.",
            project.title, teacher.name
        ),
        NotificationType::Feedback,
        Priority::Low,
        Some("/student/feedback"),
    )
    .await;

    Ok((updated, feedback))
}

/// Whether `user` may download files of `project`.
pub fn can_download(user: &User, project: &Project) -> bool {
    match user.role {
        Role::Admin => true,
        Role::Teacher => project.supervisor == Some(user.id),
        Role::Student => project.student == user.id,
    }
}

/// Fails with 403 unless `user` may download files of `project`.
pub fn check_download(user: &User, project: &Project) -> Result<(), Problem> {
    if can_download(user, project) {
        Ok(())
    } else {
        Err(project_problem::download_forbidden())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::memory::MemoryStore;
    use crate::data::notification::Notification;
    use crate::data::user::PasswordHash;
    use crate::data::{NotificationQuery, ProjectQuery};
    use crate::mail::testing::RecordingMailer;
    use rocket::http::Status;

    async fn user(store: &MemoryStore, name: &str, role: Role) -> User {
        let user = User::new(
            name,
            format!("{}@example.com", name.to_lowercase()),
            PasswordHash::new_unchecked("x"),
            role,
        );
        store.insert_user(&user).await.expect("user inserted");
        user
    }

    async fn teacher(store: &MemoryStore, name: &str, max_students: u32) -> User {
        let mut teacher = user(store, name, Role::Teacher).await;
        teacher.max_students = max_students;
        store.save_user(&teacher).await.expect("user saved");
        teacher
    }

    async fn fresh(store: &MemoryStore, id: Uuid) -> User {
        store
            .get_user(id)
            .await
            .expect("store works")
            .expect("user exists")
    }

    async fn proposal(store: &MemoryStore, student: &User, status: ProjectStatus) -> Project {
        let project = submit_proposal(
            store,
            student,
            ProposalData {
                title: "X".to_string(),
                description: "Y".to_string(),
            },
        )
        .await
        .expect("proposal submitted");
        if status != ProjectStatus::Pending {
            store
                .set_project_status(project.id, status)
                .await
                .expect("store works");
        }
        project
    }

    async fn notifications(store: &MemoryStore, user: Uuid) -> Vec<Notification> {
        store
            .list_notifications(
                &NotificationQuery {
                    user: Some(user),
                    ..Default::default()
                },
                None,
            )
            .await
            .expect("store works")
    }

    #[rocket::async_test]
    async fn proposals_start_pending_and_link_the_student() {
        let store = MemoryStore::default();
        let student = user(&store, "Sam", Role::Student).await;

        let project = proposal(&store, &student, ProjectStatus::Pending).await;
        assert_eq!(project.status, ProjectStatus::Pending);
        assert_eq!(fresh(&store, student.id).await.project, Some(project.id));
    }

    #[rocket::async_test]
    async fn second_proposal_is_refused_unless_rejected() {
        let store = MemoryStore::default();
        let student = user(&store, "Sam", Role::Student).await;
        let first = proposal(&store, &student, ProjectStatus::Pending).await;

        let again = submit_proposal(
            &store,
            &student,
            ProposalData {
                title: "Z".to_string(),
                description: "W".to_string(),
            },
        )
        .await;
        assert_eq!(again.map_err(|p| p.status).map(|_| ()), Err(Status::BadRequest));

        store
            .set_project_status(first.id, ProjectStatus::Rejected)
            .await
            .expect("store works");
        let second = proposal(&store, &student, ProjectStatus::Pending).await;

        let projects = store
            .list_projects(
                &ProjectQuery {
                    student: Some(student.id),
                    ..Default::default()
                },
                None,
            )
            .await
            .expect("store works");
        assert_eq!(projects.len(), 1);
        assert_eq!(projects[0].id, second.id);
    }

    #[rocket::async_test]
    async fn requests_notify_the_teacher() {
        let store = MemoryStore::default();
        let student = user(&store, "Sam", Role::Student).await;
        let t = teacher(&store, "Tess", 2).await;

        let request = request_supervisor(&store, &student, Some(t.id), " please ")
            .await
            .expect("request filed");
        assert_eq!(request.status, RequestStatus::Pending);
        assert_eq!(request.message, "please");

        let sent = notifications(&store, t.id).await;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].kind, NotificationType::Request);
        assert_eq!(sent[0].priority, Priority::Medium);
        assert_eq!(sent[0].link.as_deref(), Some("/teacher/requests"));
    }

    #[rocket::async_test]
    async fn duplicate_pending_requests_are_refused() {
        let store = MemoryStore::default();
        let student = user(&store, "Sam", Role::Student).await;
        let t = teacher(&store, "Tess", 2).await;

        request_supervisor(&store, &student, Some(t.id), "one")
            .await
            .expect("first request");
        let second = request_supervisor(&store, &student, Some(t.id), "two").await;
        assert_eq!(
            second.map(|_| ()).map_err(|p| p.message),
            Err("A pending request already exists between this student and supervisor.".to_string())
        );
    }

    #[rocket::async_test]
    async fn requests_check_student_teacher_and_capacity() {
        let store = MemoryStore::default();
        let mut student = user(&store, "Sam", Role::Student).await;
        let other = user(&store, "Olly", Role::Student).await;
        let full = teacher(&store, "Tess", 1).await;
        let mut full_now = fresh(&store, full.id).await;
        full_now.assigned_students.push(other.id);
        store.save_user(&full_now).await.expect("user saved");

        let not_teacher = request_supervisor(&store, &student, Some(other.id), "hi").await;
        assert_eq!(
            not_teacher.map(|_| ()).map_err(|p| p.status),
            Err(Status::NotFound)
        );

        let at_capacity = request_supervisor(&store, &student, Some(full.id), "hi").await;
        assert_eq!(
            at_capacity.map(|_| ()).map_err(|p| p.message),
            Err("Supervisor has reached maximum student capacity.".to_string())
        );

        let empty = request_supervisor(&store, &student, Some(full.id), "   ").await;
        assert_eq!(empty.map(|_| ()).map_err(|p| p.status), Err(Status::BadRequest));

        student.supervisor = Some(full.id);
        let supervised = request_supervisor(&store, &student, Some(full.id), "hi").await;
        assert_eq!(
            supervised.map(|_| ()).map_err(|p| p.message),
            Err("You already have a supervisor assigned.".to_string())
        );
    }

    #[rocket::async_test]
    async fn requests_are_processed_once() {
        let store = MemoryStore::default();
        let mailer = RecordingMailer::default();
        let student = user(&store, "Sam", Role::Student).await;
        let t = teacher(&store, "Tess", 1).await;
        let request = request_supervisor(&store, &student, Some(t.id), "hi")
            .await
            .expect("request filed");

        let accepted = accept_request(&store, &mailer, &t, request.id)
            .await
            .expect("accepted");
        assert_eq!(accepted.status, RequestStatus::Accepted);

        let again = reject_request(&store, &mailer, &t, request.id).await;
        assert_eq!(
            again.map(|_| ()).map_err(|p| (p.status, p.message)),
            Err((
                Status::BadRequest,
                "Request has already been processed.".to_string()
            ))
        );

        let sent = mailer.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, student.email);
        assert_eq!(sent[0].subject, "CapTrak - Request Accepted");

        let student_notes = notifications(&store, student.id).await;
        assert_eq!(student_notes.len(), 1);
        assert_eq!(student_notes[0].kind, NotificationType::Approval);
        assert_eq!(student_notes[0].priority, Priority::High);
    }

    #[rocket::async_test]
    async fn accepting_does_not_assign() {
        let store = MemoryStore::default();
        let mailer = RecordingMailer::default();
        let student = user(&store, "Sam", Role::Student).await;
        let t = teacher(&store, "Tess", 1).await;
        let request = request_supervisor(&store, &student, Some(t.id), "hi")
            .await
            .expect("request filed");

        accept_request(&store, &mailer, &t, request.id)
            .await
            .expect("accepted");

        assert!(fresh(&store, student.id).await.supervisor.is_none());
        assert!(fresh(&store, t.id).await.assigned_students.is_empty());
    }

    #[rocket::async_test]
    async fn other_teachers_cannot_decide_requests() {
        let store = MemoryStore::default();
        let mailer = RecordingMailer::default();
        let student = user(&store, "Sam", Role::Student).await;
        let t = teacher(&store, "Tess", 1).await;
        let intruder = teacher(&store, "Ivan", 1).await;
        let request = request_supervisor(&store, &student, Some(t.id), "hi")
            .await
            .expect("request filed");

        let result = reject_request(&store, &mailer, &intruder, request.id).await;
        assert_eq!(
            result.map(|_| ()).map_err(|p| (p.status, p.message)),
            Err((
                Status::NotFound,
                "Request not found or already processed.".to_string()
            ))
        );
        let missing = accept_request(&store, &mailer, &t, Uuid::new_v4()).await;
        assert_eq!(missing.map(|_| ()).map_err(|p| p.status), Err(Status::NotFound));

        let stored = store
            .get_request(request.id)
            .await
            .expect("store works")
            .expect("request exists");
        assert_eq!(stored.status, RequestStatus::Pending);
    }

    #[rocket::async_test]
    async fn rejection_survives_mail_failure() {
        let store = MemoryStore::default();
        let mailer = RecordingMailer::failing();
        let student = user(&store, "Sam", Role::Student).await;
        let t = teacher(&store, "Tess", 1).await;
        let request = request_supervisor(&store, &student, Some(t.id), "hi")
            .await
            .expect("request filed");

        let rejected = reject_request(&store, &mailer, &t, request.id)
            .await
            .expect("rejected despite mail failure");
        assert_eq!(rejected.status, RequestStatus::Rejected);
        let notes = notifications(&store, student.id).await;
        assert_eq!(notes[0].kind, NotificationType::Rejection);
    }

    #[rocket::async_test]
    async fn assignment_needs_both_ids_and_a_project() {
        let store = MemoryStore::default();
        let student = user(&store, "Sam", Role::Student).await;
        let t = teacher(&store, "Tess", 1).await;

        let missing = assign_supervisor(&store, Some(student.id), None).await;
        assert_eq!(
            missing.map(|_| ()).map_err(|p| p.message),
            Err("Both studentId and supervisorId are required to assign a supervisor.".to_string())
        );

        let no_project = assign_supervisor(&store, Some(student.id), Some(t.id)).await;
        assert_eq!(
            no_project.map(|_| ()).map_err(|p| (p.status, p.message)),
            Err((
                Status::NotFound,
                "No project found for the given studentId.".to_string()
            ))
        );
    }

    #[rocket::async_test]
    async fn assignment_requires_an_approved_project() {
        let store = MemoryStore::default();
        let student = user(&store, "Sam", Role::Student).await;
        let t = teacher(&store, "Tess", 3).await;
        let project = proposal(&store, &student, ProjectStatus::Pending).await;

        let pending = assign_supervisor(&store, Some(student.id), Some(t.id)).await;
        assert_eq!(
            pending.map(|_| ()).map_err(|p| p.message),
            Err("Cannot assign supervisor to a project that is not approved.".to_string())
        );

        store
            .set_project_status(project.id, ProjectStatus::Approved)
            .await
            .expect("store works");
        let pair = assign_supervisor(&store, Some(student.id), Some(t.id))
            .await
            .expect("assigned");
        assert_eq!(pair.student.supervisor, Some(t.id));
        assert_eq!(pair.supervisor.assigned_students, vec![student.id]);

        let stored = store
            .get_project(project.id)
            .await
            .expect("store works")
            .expect("project exists");
        assert_eq!(stored.supervisor, Some(t.id));

        let student_notes = notifications(&store, student.id).await;
        assert_eq!(student_notes[0].kind, NotificationType::Approval);
        assert_eq!(
            student_notes[0].message,
            "Tess has been assigned as supervisor for your project."
        );
        let teacher_notes = notifications(&store, t.id).await;
        assert_eq!(teacher_notes[0].kind, NotificationType::Comment);
        assert_eq!(teacher_notes[0].link.as_deref(), Some("/teacher/status"));

        let twice = assign_supervisor(&store, Some(student.id), Some(t.id)).await;
        assert_eq!(
            twice.map(|_| ()).map_err(|p| p.message),
            Err("Supervisor has already been assigned to this student.".to_string())
        );
    }

    #[rocket::async_test]
    async fn assignment_respects_capacity() {
        let store = MemoryStore::default();
        let t = teacher(&store, "Tess", 1).await;
        let first = user(&store, "Sam", Role::Student).await;
        let second = user(&store, "Sue", Role::Student).await;
        proposal(&store, &first, ProjectStatus::Approved).await;
        proposal(&store, &second, ProjectStatus::Approved).await;

        assign_supervisor(&store, Some(first.id), Some(t.id))
            .await
            .expect("first assignment");
        let full = assign_supervisor(&store, Some(second.id), Some(t.id)).await;
        assert_eq!(
            full.map(|_| ()).map_err(|p| (p.status, p.message)),
            Err((
                Status::BadRequest,
                "Supervisor has reached maximum student capacity.".to_string()
            ))
        );

        let t = fresh(&store, t.id).await;
        assert!(t.assigned_students.len() as u32 <= t.max_students);
    }

    #[rocket::async_test]
    async fn assignment_checks_roles() {
        let store = MemoryStore::default();
        let student = user(&store, "Sam", Role::Student).await;
        let admin = user(&store, "Ada", Role::Admin).await;
        proposal(&store, &student, ProjectStatus::Approved).await;

        let not_teacher = assign_supervisor(&store, Some(student.id), Some(admin.id)).await;
        assert_eq!(
            not_teacher.map(|_| ()).map_err(|p| (p.status, p.message)),
            Err((Status::NotFound, "Invalid supervisor selected.".to_string()))
        );
    }

    #[rocket::async_test]
    async fn only_the_supervisor_completes_or_reviews() {
        let store = MemoryStore::default();
        let student = user(&store, "Sam", Role::Student).await;
        let t = teacher(&store, "Tess", 1).await;
        let other = teacher(&store, "Ivan", 1).await;
        let project = proposal(&store, &student, ProjectStatus::Approved).await;
        assign_supervisor(&store, Some(student.id), Some(t.id))
            .await
            .expect("assigned");

        let forbidden = mark_completed(&store, &other, project.id).await;
        assert_eq!(forbidden.map(|_| ()).map_err(|p| p.status), Err(Status::Forbidden));

        let feedback: FeedbackData =
            serde_json::from_str(r#"{"title": "Draft", "message": "Good start"}"#)
                .expect("valid feedback");
        let (updated, added) = add_feedback(&store, &t, project.id, feedback)
            .await
            .expect("feedback added");
        assert_eq!(updated.feedback.len(), 1);
        assert_eq!(added.supervisor_id, t.id);

        let completed = mark_completed(&store, &t, project.id)
            .await
            .expect("completed");
        assert_eq!(completed.status, ProjectStatus::Completed);

        let notes = notifications(&store, student.id).await;
        assert!(notes.iter().all(|n| n.priority != Priority::Medium));
        assert_eq!(notes[0].priority, Priority::Low);
    }

    #[rocket::async_test]
    async fn downloads_are_limited_to_involved_users() {
        let store = MemoryStore::default();
        let student = user(&store, "Sam", Role::Student).await;
        let stranger = user(&store, "Sid", Role::Student).await;
        let t = teacher(&store, "Tess", 1).await;
        let other = teacher(&store, "Ivan", 1).await;
        let admin = user(&store, "Ada", Role::Admin).await;

        let mut project = Project::new(student.id, "X", "Y");
        project.supervisor = Some(t.id);

        assert!(can_download(&student, &project));
        assert!(can_download(&t, &project));
        assert!(can_download(&admin, &project));
        assert!(!can_download(&stranger, &project));
        assert_eq!(
            check_download(&other, &project).map_err(|p| p.status),
            Err(Status::Forbidden)
        );

    }
}
