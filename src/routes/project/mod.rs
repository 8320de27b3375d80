mod handler;
mod intake;
mod model;

pub use handler::{ProjectForm, create_form, create_project, delete_project, list_projects, show_project};
pub use intake::{LinkSubmission, ProjectSubmission, ValidatedLink, ValidatedProject};
pub use model::{LIFECYCLE_STATUSES, NewProject, Priority, Project, ProjectDetail, UnknownPriority};
