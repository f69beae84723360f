#[rocket::launch]
fn rocket() -> _ {
    auth_gate::rocket()
}
